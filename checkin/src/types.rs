//! Domain types for the check-in flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an event, as encoded in its QR code after normalization
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Wraps an already-normalized identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the signed-in member checking in
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a user identifier from the auth session
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One check-in submission
///
/// Sent to the backend exactly once. A failed attempt is never resent; the
/// member scans again, which creates a new attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInAttempt {
    /// Event being checked into
    pub event_id: EventId,
    /// Member checking in
    pub user_id: UserId,
    /// When the scan was accepted
    pub timestamp: DateTime<Utc>,
}

/// Classified result of a check-in attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckInOutcome {
    /// The backend recorded the check-in
    Success {
        /// Display name of the event
        event_name: String,
    },
    /// The member was already checked in to this event
    AlreadyCheckedIn,
    /// The code does not name a known event
    InvalidEvent,
    /// The backend could not be reached
    NetworkError {
        /// Transport-level description
        message: String,
    },
    /// Anything the dispatcher could not classify
    Unexpected {
        /// Description for logs and the prompt
        message: String,
    },
}

impl CheckInOutcome {
    /// Whether the check-in was recorded
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short stable name, used as a metric label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::AlreadyCheckedIn => "already_checked_in",
            Self::InvalidEvent => "invalid_event",
            Self::NetworkError { .. } => "network_error",
            Self::Unexpected { .. } => "unexpected",
        }
    }
}
