//! Audit event types.
//!
//! These types are designed to be:
//! - Cheap to create on the foreground thread
//! - Serializable to one JSON line each for the history file

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DisposalTimeout;
use crate::session::{SessionId, WorldInfo};

/// Something notable that happened to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred
    pub timestamp: DateTime<Utc>,

    /// Session the event concerns
    pub session_id: Option<SessionId>,

    /// Event payload
    pub payload: AuditPayload,
}

/// Event payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuditPayload {
    /// A session was placed in the slot
    SessionOpened {
        generation: u64,
        world: WorldInfo,
    },

    /// A session's renderer was released
    SessionDisposed {
        generation: u64,
        /// Time spent waiting for in-flight ticks
        waited_ms: u64,
        /// True when the grace period ran out first
        forced: bool,
    },

    /// Disposal went ahead while a tick still held the generation
    GracePeriodExceeded {
        generation: u64,
        grace_ms: u64,
        in_flight: usize,
    },
}

impl AuditPayload {
    /// Get the event type as a string
    pub fn event_type_str(&self) -> &'static str {
        match self {
            AuditPayload::SessionOpened { .. } => "session_opened",
            AuditPayload::SessionDisposed { .. } => "session_disposed",
            AuditPayload::GracePeriodExceeded { .. } => "grace_period_exceeded",
        }
    }
}

impl AuditEvent {
    pub fn session_opened(session_id: SessionId, generation: u64, world: WorldInfo) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: Some(session_id),
            payload: AuditPayload::SessionOpened { generation, world },
        }
    }

    pub fn session_disposed(
        session_id: SessionId,
        generation: u64,
        waited_ms: u64,
        forced: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: Some(session_id),
            payload: AuditPayload::SessionDisposed {
                generation,
                waited_ms,
                forced,
            },
        }
    }

    pub fn grace_period_exceeded(session_id: Option<SessionId>, timeout: &DisposalTimeout) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id,
            payload: AuditPayload::GracePeriodExceeded {
                generation: timeout.generation,
                grace_ms: timeout.grace.as_millis() as u64,
                in_flight: timeout.in_flight,
            },
        }
    }
}
