//! Check-in dispatcher: one remote call per accepted scan, classified.
//!
//! The backend is opaque and sits behind [`CheckInService`]. Idempotency is
//! its job: the dispatcher never retries, and a repeated submission comes
//! back as an "already registered" error which maps to
//! [`CheckInOutcome::AlreadyCheckedIn`].

use crate::metrics;
use crate::types::{CheckInAttempt, CheckInOutcome, EventId, UserId};
use crate::validator::{PayloadFormat, normalize};
use rollcall_core::environment::Clock;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;

/// Body of the remote check-in call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInRequest {
    /// Normalized event identifier
    pub event_identifier: String,
    /// Member checking in
    pub user_identifier: String,
}

impl From<&CheckInAttempt> for CheckInRequest {
    fn from(attempt: &CheckInAttempt) -> Self {
        Self {
            event_identifier: attempt.event_id.as_str().to_owned(),
            user_identifier: attempt.user_id.as_str().to_owned(),
        }
    }
}

/// Body returned by the remote check-in call
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInResponse {
    /// Whether the check-in was recorded
    #[serde(default)]
    pub success: bool,
    /// Payload on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CheckInData>,
    /// Reason on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

/// Success payload
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInData {
    /// The event checked into
    #[serde(default)]
    pub event: Option<EventSummary>,
}

/// The slice of the event record the app displays
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
}

/// Error reported by the backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Machine-readable code, e.g. `ALREADY_REGISTERED` or a Postgres SQLSTATE
    pub code: String,
    /// Human-readable description
    #[serde(default)]
    pub message: String,
}

impl CheckInResponse {
    /// A successful response naming the event
    #[must_use]
    pub fn success(event_name: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(CheckInData {
                event: Some(EventSummary {
                    name: Some(event_name.into()),
                }),
            }),
            error: None,
        }
    }

    /// A failed response carrying a backend error code
    #[must_use]
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(RemoteError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    fn event_name(&self) -> Option<&str> {
        self.data
            .as_ref()?
            .event
            .as_ref()?
            .name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }
}

/// Failures below the level of a decoded backend response
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ServiceError {
    /// The request did not complete in time
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Credentials were rejected
    #[error("unauthorized (status {status})")]
    Unauthorized {
        /// HTTP status code
        status: u16,
    },

    /// Unexpected HTTP status
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Body could not be decoded
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Whether the backend was unreachable rather than wrong
    #[must_use]
    pub const fn is_network(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Unauthorized { .. } | Self::Decode(_) => false,
        }
    }
}

/// Future returned by [`CheckInService::check_in`]
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<CheckInResponse, ServiceError>> + Send>>;

/// The remote check-in operation
///
/// Abstraction over the backend RPC so tests and the offline CLI can swap in
/// an in-memory implementation.
pub trait CheckInService: Send + Sync {
    /// Record a check-in
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when no decodable response was received.
    fn check_in(&self, request: CheckInRequest) -> ServiceFuture;
}

/// Map a service result to the outcome shown to the member
#[must_use]
pub fn classify(
    result: &Result<CheckInResponse, ServiceError>,
    event_id: &EventId,
) -> CheckInOutcome {
    match result {
        Ok(response) if response.success => CheckInOutcome::Success {
            event_name: response
                .event_name()
                .map_or_else(|| event_id.to_string(), str::to_owned),
        },
        Ok(response) => match &response.error {
            Some(error) => classify_code(error),
            None => CheckInOutcome::Unexpected {
                message: "backend reported failure without an error".to_owned(),
            },
        },
        Err(error) if error.is_network() => CheckInOutcome::NetworkError {
            message: error.to_string(),
        },
        Err(error) => CheckInOutcome::Unexpected {
            message: error.to_string(),
        },
    }
}

fn classify_code(error: &RemoteError) -> CheckInOutcome {
    match error.code.trim().to_ascii_uppercase().as_str() {
        "ALREADY_REGISTERED" | "ALREADY_CHECKED_IN" | "23505" => CheckInOutcome::AlreadyCheckedIn,
        "NOT_FOUND" | "EVENT_NOT_FOUND" | "INVALID_EVENT" | "VALIDATION_ERROR" | "22P02" => {
            CheckInOutcome::InvalidEvent
        },
        _ => CheckInOutcome::Unexpected {
            message: if error.message.is_empty() {
                error.code.clone()
            } else {
                format!("{}: {}", error.code, error.message)
            },
        },
    }
}

/// Sends check-in attempts and classifies what comes back
#[derive(Clone)]
pub struct Dispatcher {
    service: Arc<dyn CheckInService>,
    clock: Arc<dyn Clock>,
    format: PayloadFormat,
}

impl Dispatcher {
    /// Create a dispatcher over a backend
    #[must_use]
    pub fn new(
        service: Arc<dyn CheckInService>,
        clock: Arc<dyn Clock>,
        format: PayloadFormat,
    ) -> Self {
        Self {
            service,
            clock,
            format,
        }
    }

    /// Payload format used to normalize identifiers
    #[must_use]
    pub const fn format(&self) -> &PayloadFormat {
        &self.format
    }

    /// Stamp a new attempt with the current time
    #[must_use]
    pub fn attempt(&self, event_id: EventId, user_id: UserId) -> CheckInAttempt {
        CheckInAttempt {
            event_id,
            user_id,
            timestamp: self.clock.now(),
        }
    }

    /// Normalize a raw identifier and check in with it
    ///
    /// An identifier that does not normalize never reaches the backend and
    /// comes back as [`CheckInOutcome::InvalidEvent`].
    pub async fn submit(&self, identifier: &str, user_id: &UserId) -> CheckInOutcome {
        match normalize(identifier, &self.format) {
            Ok(event_id) => self.dispatch(self.attempt(event_id, user_id.clone())).await,
            Err(rejection) => {
                tracing::debug!(%rejection, "Identifier rejected before dispatch");
                CheckInOutcome::InvalidEvent
            },
        }
    }

    /// Make exactly one remote call for `attempt`
    #[tracing::instrument(
        skip(self, attempt),
        fields(event_id = %attempt.event_id, user_id = %attempt.user_id)
    )]
    pub async fn dispatch(&self, attempt: CheckInAttempt) -> CheckInOutcome {
        let started = Instant::now();
        let result = self.service.check_in(CheckInRequest::from(&attempt)).await;
        let outcome = classify(&result, &attempt.event_id);
        let elapsed = started.elapsed();

        metrics::record_dispatch(&outcome, elapsed);

        match &outcome {
            CheckInOutcome::Success { event_name } => {
                tracing::info!(%event_name, elapsed_ms = elapsed.as_millis(), "Check-in recorded");
            },
            CheckInOutcome::AlreadyCheckedIn | CheckInOutcome::InvalidEvent => {
                tracing::info!(outcome = outcome.label(), "Check-in declined");
            },
            CheckInOutcome::NetworkError { message } => {
                tracing::warn!(%message, "Check-in backend unreachable");
            },
            CheckInOutcome::Unexpected { message } => {
                tracing::error!(%message, ?result, "Unclassified check-in response");
            },
        }

        outcome
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use crate::memory::InMemoryCheckInService;
    use rollcall_testing::test_clock;
    use std::time::Duration;

    fn event() -> EventId {
        EventId::new("evt_12345")
    }

    #[test]
    fn test_success_uses_event_name() {
        let outcome = classify(&Ok(CheckInResponse::success("Spring Mixer")), &event());
        assert_eq!(
            outcome,
            CheckInOutcome::Success {
                event_name: "Spring Mixer".into()
            }
        );
    }

    #[test]
    fn test_success_without_name_falls_back_to_identifier() {
        let response = CheckInResponse {
            success: true,
            ..CheckInResponse::default()
        };
        assert_eq!(
            classify(&Ok(response), &event()),
            CheckInOutcome::Success {
                event_name: "evt_12345".into()
            }
        );
    }

    #[test]
    fn test_error_codes() {
        let cases = [
            ("ALREADY_REGISTERED", CheckInOutcome::AlreadyCheckedIn),
            ("already_checked_in", CheckInOutcome::AlreadyCheckedIn),
            ("23505", CheckInOutcome::AlreadyCheckedIn),
            ("NOT_FOUND", CheckInOutcome::InvalidEvent),
            ("EVENT_NOT_FOUND", CheckInOutcome::InvalidEvent),
            ("INVALID_EVENT", CheckInOutcome::InvalidEvent),
            ("VALIDATION_ERROR", CheckInOutcome::InvalidEvent),
            ("22P02", CheckInOutcome::InvalidEvent),
        ];

        for (code, expected) in cases {
            let response = CheckInResponse::failure(code, "nope");
            assert_eq!(classify(&Ok(response), &event()), expected, "code {code}");
        }
    }

    #[test]
    fn test_unknown_code_is_unexpected() {
        let response = CheckInResponse::failure("RATE_LIMITED", "slow down");
        assert_eq!(
            classify(&Ok(response), &event()),
            CheckInOutcome::Unexpected {
                message: "RATE_LIMITED: slow down".into()
            }
        );

        let bare = CheckInResponse::default();
        assert!(matches!(
            classify(&Ok(bare), &event()),
            CheckInOutcome::Unexpected { .. }
        ));
    }

    #[test]
    fn test_service_errors() {
        let network = [
            ServiceError::Timeout,
            ServiceError::Transport("connection refused".into()),
            ServiceError::Status {
                status: 503,
                body: String::new(),
            },
        ];
        for error in network {
            assert!(matches!(
                classify(&Err(error), &event()),
                CheckInOutcome::NetworkError { .. }
            ));
        }

        let other = [
            ServiceError::Unauthorized { status: 401 },
            ServiceError::Decode("expected value".into()),
            ServiceError::Status {
                status: 418,
                body: "teapot".into(),
            },
        ];
        for error in other {
            assert!(matches!(
                classify(&Err(error), &event()),
                CheckInOutcome::Unexpected { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_submit_normalizes_before_calling() {
        let service = Arc::new(InMemoryCheckInService::with_events([("evt_12345", "Mixer")]));
        let dispatcher = Dispatcher::new(
            service.clone(),
            Arc::new(test_clock()),
            PayloadFormat::default(),
        );

        let outcome = dispatcher
            .submit("  event:evt_12345 ", &UserId::new("u-1"))
            .await;

        assert!(outcome.is_success());
        let requests = service.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].event_identifier, "evt_12345");
        assert_eq!(requests[0].user_identifier, "u-1");
    }

    #[tokio::test]
    async fn test_second_submission_is_already_checked_in() {
        let service = Arc::new(InMemoryCheckInService::with_events([("evt_12345", "Mixer")]));
        let dispatcher = Dispatcher::new(
            service.clone(),
            Arc::new(test_clock()),
            PayloadFormat::default(),
        );
        let user = UserId::new("u-1");

        assert!(dispatcher.submit("evt_12345", &user).await.is_success());
        assert_eq!(
            dispatcher.submit("evt_12345", &user).await,
            CheckInOutcome::AlreadyCheckedIn
        );
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_is_timed_on_the_runtime_clock() {
        let service = InMemoryCheckInService::with_events([("evt_12345", "Mixer")])
            .with_latency(Duration::from_millis(150));
        let dispatcher = Dispatcher::new(
            Arc::new(service),
            Arc::new(test_clock()),
            PayloadFormat::default(),
        );
        let attempt = dispatcher.attempt(event(), UserId::new("u-1"));

        let started = Instant::now();
        let outcome = dispatcher.dispatch(attempt).await;

        assert!(outcome.is_success());
        // Paused time only moves for the backend latency.
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_unusable_identifier_never_calls_backend() {
        let service = Arc::new(InMemoryCheckInService::new());
        let dispatcher = Dispatcher::new(
            service.clone(),
            Arc::new(test_clock()),
            PayloadFormat::default(),
        );

        let outcome = dispatcher.submit("event:", &UserId::new("u-1")).await;

        assert_eq!(outcome, CheckInOutcome::InvalidEvent);
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn test_attempt_is_stamped_by_clock() {
        let dispatcher = Dispatcher::new(
            Arc::new(InMemoryCheckInService::new()),
            Arc::new(test_clock()),
            PayloadFormat::default(),
        );

        let attempt = dispatcher.attempt(event(), UserId::new("u-1"));
        assert_eq!(attempt.timestamp, test_clock().now());
    }

    #[test]
    fn test_response_decodes_wire_shape() {
        let json = r#"{"success":true,"data":{"event":{"name":"Gala","id":"evt_1"}}}"#;
        let response: CheckInResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.event_name(), Some("Gala"));

        let json = r#"{"success":false,"error":{"code":"ALREADY_REGISTERED"}}"#;
        let response: CheckInResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.error.unwrap().message, "");
    }
}
