//! Parsing helpers for the go-to and capture commands.

use std::path::{Path, PathBuf};

use crate::error::CoordinateError;
use crate::viewport::WorldPoint;

/// Parse "x, y" into a world point.
///
/// Spaces are ignored anywhere in the input. Exactly two integer values are
/// required.
pub fn parse_coordinates(input: &str) -> Result<WorldPoint, CoordinateError> {
    let compact: String = input.chars().filter(|c| *c != ' ').collect();
    let parts: Vec<&str> = compact.split(',').collect();
    if parts.len() != 2 {
        return Err(CoordinateError::WrongArity(parts.len()));
    }

    let parse = |part: &str| {
        part.parse::<i64>()
            .map_err(|_| CoordinateError::InvalidNumber(part.to_string()))
    };
    Ok(WorldPoint::new(parse(parts[0])?, parse(parts[1])?))
}

/// Append `.png` unless the path already ends with it (any case).
pub fn ensure_png_extension(path: &Path) -> PathBuf {
    let is_png = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    if is_png {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(".png");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_spaces() {
        assert_eq!(
            parse_coordinates(" 123 , -456 ").unwrap(),
            WorldPoint::new(123, -456)
        );
        assert_eq!(
            parse_coordinates("1 2 3,4").unwrap(),
            WorldPoint::new(123, 4)
        );
    }

    #[test]
    fn test_parse_wrong_arity() {
        assert_eq!(
            parse_coordinates("1,2,3"),
            Err(CoordinateError::WrongArity(3))
        );
        assert_eq!(parse_coordinates("12"), Err(CoordinateError::WrongArity(1)));
    }

    #[test]
    fn test_parse_invalid_number() {
        assert_eq!(
            parse_coordinates("12,abc"),
            Err(CoordinateError::InvalidNumber("abc".to_string()))
        );
        assert!(parse_coordinates(",5").is_err());
    }

    #[test]
    fn test_png_extension_appended() {
        assert_eq!(
            ensure_png_extension(Path::new("/tmp/shot")),
            PathBuf::from("/tmp/shot.png")
        );
        assert_eq!(
            ensure_png_extension(Path::new("/tmp/shot.jpg")),
            PathBuf::from("/tmp/shot.jpg.png")
        );
    }

    #[test]
    fn test_png_extension_kept() {
        assert_eq!(
            ensure_png_extension(Path::new("map.PNG")),
            PathBuf::from("map.PNG")
        );
    }
}
