//! In-memory check-in backend for tests and offline runs.

use crate::dispatcher::{CheckInRequest, CheckInResponse, CheckInService, ServiceError, ServiceFuture};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Inner {
    events: HashMap<String, String>,
    checked_in: HashSet<(String, String)>,
    requests: Vec<CheckInRequest>,
    failures: VecDeque<ServiceError>,
}

/// Backend holding known events and a uniqueness set of check-ins
///
/// Behaves like the real RPC: unknown events are `NOT_FOUND` and a second
/// check-in for the same member and event is `ALREADY_REGISTERED`. Every
/// request is recorded so tests can count calls.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCheckInService {
    inner: Arc<Mutex<Inner>>,
    latency: Duration,
}

impl InMemoryCheckInService {
    /// Empty backend: every event is unknown
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend seeded with `(identifier, name)` pairs
    #[must_use]
    pub fn with_events<I, K, V>(events: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let service = Self::new();
        for (id, name) in events {
            service.add_event(id, name);
        }
        service
    }

    /// Delay every response by `latency`
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Register an event
    pub fn add_event(&self, id: impl Into<String>, name: impl Into<String>) {
        self.lock().events.insert(id.into(), name.into());
    }

    /// Make the next call fail with `error` instead of answering
    ///
    /// Failures queue up and are consumed one per call.
    pub fn push_failure(&self, error: ServiceError) {
        self.lock().failures.push_back(error);
    }

    /// Every request received, oldest first
    #[must_use]
    pub fn requests(&self) -> Vec<CheckInRequest> {
        self.lock().requests.clone()
    }

    /// Number of requests received
    #[must_use]
    pub fn calls(&self) -> usize {
        self.lock().requests.len()
    }

    /// Whether `user` is checked in to `event`
    #[must_use]
    pub fn is_checked_in(&self, event: &str, user: &str) -> bool {
        self.lock()
            .checked_in
            .contains(&(event.to_owned(), user.to_owned()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn answer(&self, request: CheckInRequest) -> Result<CheckInResponse, ServiceError> {
        let mut inner = self.lock();
        inner.requests.push(request.clone());

        if let Some(error) = inner.failures.pop_front() {
            return Err(error);
        }

        let Some(name) = inner.events.get(&request.event_identifier).cloned() else {
            return Ok(CheckInResponse::failure("NOT_FOUND", "event not found"));
        };

        let key = (request.event_identifier, request.user_identifier);
        if inner.checked_in.insert(key) {
            Ok(CheckInResponse::success(name))
        } else {
            Ok(CheckInResponse::failure(
                "ALREADY_REGISTERED",
                "already checked in to this event",
            ))
        }
    }
}

impl CheckInService for InMemoryCheckInService {
    fn check_in(&self, request: CheckInRequest) -> ServiceFuture {
        let service = self.clone();
        Box::pin(async move {
            if !service.latency.is_zero() {
                tokio::time::sleep(service.latency).await;
            }
            service.answer(request)
        })
    }
}
