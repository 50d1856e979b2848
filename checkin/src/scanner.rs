//! Scanner controller: the QR check-in admission flow as a reducer.
//!
//! ```text
//! Idle -> PermissionPending -> { PermissionDenied | Ready } -> Scanning
//!      -> Processing -> Presenting -> { Scanning (lock released) | Closed }
//! ```
//!
//! Camera callbacks, permission answers, backend results, prompt responses
//! and timers all arrive as [`ScannerAction`]s. The store reduces them one at
//! a time, so validating a frame and taking the scan lock is a single step
//! that no other input can interleave with.

use crate::camera::{BarcodeKind, Camera, CameraError, DecodeEvent, PermissionStatus};
use crate::dispatcher::Dispatcher;
use crate::haptics::Haptics;
use crate::lock::{CooldownToken, ScanLock};
use crate::metrics;
use crate::prompt::{Prompt, PromptResponse};
use crate::types::{CheckInAttempt, CheckInOutcome, EventId, UserId};
use crate::validator::{ScanRejection, validate};
use rollcall_core::{
    SmallVec, async_effect, delay, effect::Effect, fire_and_forget, reducer::Reducer, smallvec,
};
use std::sync::Arc;
use std::time::Duration;

/// Default pause before the same code can be scanned again
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(2000);

/// Where the scanner is in the admission flow
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScannerPhase {
    /// Not opened yet
    Idle,
    /// Waiting for the OS permission dialog
    PermissionPending,
    /// Camera access refused
    PermissionDenied {
        /// Whether asking again can still show the OS dialog
        can_ask_again: bool,
    },
    /// Permission granted, camera starting
    Ready,
    /// Camera live, lock free, accepting frames
    Scanning,
    /// One attempt in flight
    Processing {
        /// The attempt being sent
        attempt: CheckInAttempt,
        /// Lock generation taken for this attempt
        ticket: u64,
    },
    /// Outcome on screen, waiting for the member
    Presenting {
        /// What happened
        outcome: CheckInOutcome,
    },
    /// Scanner dismissed
    Closed,
}

/// Everything the scanner screen needs to render and decide
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScannerState {
    /// Current phase
    pub phase: ScannerPhase,
    /// In-flight guard and duplicate suppression
    pub lock: ScanLock,
    /// Member checking in, set on open
    pub user_id: Option<UserId>,
    /// Torch state as last requested
    pub torch_on: bool,
    /// Whether the camera preview is running
    pub camera_live: bool,
    /// Dialog currently shown
    pub prompt: Option<Prompt>,
    /// Most recent rejected frame, for debugging overlays
    pub last_rejection: Option<ScanRejection>,
    /// Attempts sent since the scanner opened
    pub dispatched: u64,
}

impl ScannerState {
    /// A scanner that has not been opened
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: ScannerPhase::Idle,
            lock: ScanLock::new(),
            user_id: None,
            torch_on: false,
            camera_live: false,
            prompt: None,
            last_rejection: None,
            dispatched: 0,
        }
    }

    /// A scanner already open, camera live, for `user_id`
    #[must_use]
    pub fn scanning(user_id: UserId) -> Self {
        Self {
            phase: ScannerPhase::Scanning,
            user_id: Some(user_id),
            camera_live: true,
            ..Self::new()
        }
    }

    /// Whether a check-in attempt is in flight
    #[must_use]
    pub const fn is_processing(&self) -> bool {
        matches!(self.phase, ScannerPhase::Processing { .. })
    }

    /// The outcome on screen, if any
    #[must_use]
    pub const fn outcome(&self) -> Option<&CheckInOutcome> {
        match &self.phase {
            ScannerPhase::Presenting { outcome } => Some(outcome),
            _ => None,
        }
    }
}

impl Default for ScannerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Inputs the scanner reacts to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScannerAction {
    /// The scanner screen was opened by `user_id`
    Open {
        /// Signed-in member
        user_id: UserId,
    },
    /// The OS answered the permission request
    PermissionResolved(PermissionStatus),
    /// Ask for camera permission again after a refusal
    RetryPermission,
    /// The camera preview is running
    CameraStarted,
    /// The camera could not be started
    CameraFailed {
        /// Device error
        error: CameraError,
    },
    /// The camera decoded a barcode
    FrameDecoded(DecodeEvent),
    /// The backend answered an attempt
    CheckInFinished {
        /// The attempt that was sent
        attempt: CheckInAttempt,
        /// Lock generation the attempt was sent under
        ticket: u64,
        /// Classified result
        outcome: CheckInOutcome,
    },
    /// The member pressed a prompt button
    RespondToPrompt(PromptResponse),
    /// The member dismissed the scanner
    Close,
    /// The duplicate-suppression window of a released lock is over
    CooldownElapsed {
        /// Release that started the window
        token: CooldownToken,
    },
    /// The member pressed the torch button
    ToggleTorch,
}

/// Ports and settings the scanner needs
#[derive(Clone)]
pub struct ScannerEnvironment {
    /// Sends check-in attempts
    pub dispatcher: Dispatcher,
    /// Device camera
    pub camera: Arc<dyn Camera>,
    /// Vibration feedback
    pub haptics: Arc<dyn Haptics>,
    /// Duplicate-suppression window after a release
    pub cooldown: Duration,
}

impl ScannerEnvironment {
    /// Environment with the default cooldown
    #[must_use]
    pub fn new(dispatcher: Dispatcher, camera: Arc<dyn Camera>, haptics: Arc<dyn Haptics>) -> Self {
        Self {
            dispatcher,
            camera,
            haptics,
            cooldown: DEFAULT_COOLDOWN,
        }
    }

    /// Override the cooldown
    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

impl std::fmt::Debug for ScannerEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerEnvironment")
            .field("dispatcher", &self.dispatcher)
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

type Effects = SmallVec<[Effect<ScannerAction>; 4]>;

/// Reducer for the scanner controller
#[derive(Clone, Copy, Debug, Default)]
pub struct ScannerReducer;

impl ScannerReducer {
    /// Creates a new `ScannerReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn request_permission(env: &ScannerEnvironment) -> Effect<ScannerAction> {
        let camera = Arc::clone(&env.camera);
        async_effect! {
            let status = camera.request_permission().await;
            Some(ScannerAction::PermissionResolved(status))
        }
    }

    fn start_camera(env: &ScannerEnvironment) -> Effect<ScannerAction> {
        let camera = Arc::clone(&env.camera);
        async_effect! {
            match camera.start().await {
                Ok(()) => Some(ScannerAction::CameraStarted),
                Err(error) => Some(ScannerAction::CameraFailed { error }),
            }
        }
    }

    fn stop_camera(env: &ScannerEnvironment) -> Effect<ScannerAction> {
        let camera = Arc::clone(&env.camera);
        fire_and_forget! {
            if let Err(error) = camera.stop().await {
                tracing::warn!(%error, "Camera did not stop cleanly");
            }
        }
    }

    fn set_torch(env: &ScannerEnvironment, on: bool) -> Effect<ScannerAction> {
        let camera = Arc::clone(&env.camera);
        fire_and_forget! {
            if let Err(error) = camera.set_torch(on).await {
                tracing::warn!(%error, on, "Torch not switched");
            }
        }
    }

    fn impact(env: &ScannerEnvironment) -> Effect<ScannerAction> {
        let haptics = Arc::clone(&env.haptics);
        fire_and_forget! {
            haptics.impact();
        }
    }

    fn dispatch(
        env: &ScannerEnvironment,
        attempt: CheckInAttempt,
        ticket: u64,
    ) -> Effect<ScannerAction> {
        let dispatcher = env.dispatcher.clone();
        async_effect! {
            let outcome = dispatcher.dispatch(attempt.clone()).await;
            Some(ScannerAction::CheckInFinished { attempt, ticket, outcome })
        }
    }

    fn open(state: &mut ScannerState, user_id: UserId, env: &ScannerEnvironment) -> Effects {
        if !matches!(state.phase, ScannerPhase::Idle | ScannerPhase::Closed) {
            tracing::debug!(phase = ?state.phase, "Scanner already open");
            return SmallVec::new();
        }

        state.lock.reset();
        state.user_id = Some(user_id);
        state.torch_on = false;
        state.camera_live = false;
        state.prompt = None;
        state.last_rejection = None;
        state.dispatched = 0;
        state.phase = ScannerPhase::PermissionPending;

        smallvec![Self::request_permission(env)]
    }

    fn permission_resolved(
        state: &mut ScannerState,
        status: PermissionStatus,
        env: &ScannerEnvironment,
    ) -> Effects {
        if state.phase != ScannerPhase::PermissionPending {
            tracing::debug!(phase = ?state.phase, "Ignoring stale permission answer");
            return SmallVec::new();
        }

        if status.granted {
            state.phase = ScannerPhase::Ready;
            state.prompt = None;
            smallvec![Self::start_camera(env)]
        } else {
            tracing::info!(can_ask_again = status.can_ask_again, "Camera permission denied");
            state.phase = ScannerPhase::PermissionDenied {
                can_ask_again: status.can_ask_again,
            };
            state.prompt = Some(Prompt::permission_denied(status.can_ask_again));
            SmallVec::new()
        }
    }

    fn retry_permission(state: &mut ScannerState, env: &ScannerEnvironment) -> Effects {
        if !matches!(state.phase, ScannerPhase::PermissionDenied { .. }) {
            return SmallVec::new();
        }

        // The OS decides whether a dialog actually appears.
        state.phase = ScannerPhase::PermissionPending;
        state.prompt = None;
        smallvec![Self::request_permission(env)]
    }

    fn camera_started(state: &mut ScannerState, env: &ScannerEnvironment) -> Effects {
        match state.phase {
            ScannerPhase::Closed => {
                // Came up after the member left.
                smallvec![Self::stop_camera(env)]
            },
            ScannerPhase::Ready => {
                state.camera_live = true;
                state.phase = ScannerPhase::Scanning;
                tracing::debug!("Scanner live");
                SmallVec::new()
            },
            _ => {
                state.camera_live = true;
                SmallVec::new()
            },
        }
    }

    fn camera_failed(state: &mut ScannerState, error: &CameraError) -> Effects {
        if state.phase != ScannerPhase::Ready {
            return SmallVec::new();
        }

        tracing::error!(%error, "Camera failed to start");
        state.camera_live = false;
        Self::present(
            state,
            CheckInOutcome::Unexpected {
                message: error.to_string(),
            },
        );
        SmallVec::new()
    }

    fn frame_decoded(
        state: &mut ScannerState,
        frame: DecodeEvent,
        env: &ScannerEnvironment,
    ) -> Effects {
        let busy = matches!(
            state.phase,
            ScannerPhase::Processing { .. } | ScannerPhase::Presenting { .. }
        );

        let checked = if !busy && state.phase != ScannerPhase::Scanning {
            Err(ScanRejection::NotScanning)
        } else if let BarcodeKind::Other(kind) = &frame.kind {
            Err(ScanRejection::UnsupportedBarcode { kind: kind.clone() })
        } else {
            validate(
                &frame.data,
                state.lock.last_seen(),
                state.lock.is_locked() || busy,
                env.dispatcher.format(),
            )
        };

        let rejection = match (checked, state.user_id.clone()) {
            (Ok(event_id), Some(user_id)) => {
                if state.lock.acquire(&frame.data) {
                    return Self::accept(state, event_id, user_id, env);
                }
                ScanRejection::Locked
            },
            (Ok(_), None) => ScanRejection::NotScanning,
            (Err(rejection), _) => rejection,
        };

        Self::reject(state, rejection)
    }

    fn accept(
        state: &mut ScannerState,
        event_id: EventId,
        user_id: UserId,
        env: &ScannerEnvironment,
    ) -> Effects {
        let attempt = env.dispatcher.attempt(event_id, user_id);
        let ticket = state.lock.generation();
        tracing::info!(event_id = %attempt.event_id, ticket, "Scan accepted");
        metrics::record_scan_accepted();

        state.last_rejection = None;
        state.dispatched += 1;
        state.phase = ScannerPhase::Processing {
            attempt: attempt.clone(),
            ticket,
        };

        smallvec![Self::impact(env), Self::dispatch(env, attempt, ticket)]
    }

    fn reject(state: &mut ScannerState, rejection: ScanRejection) -> Effects {
        tracing::debug!(%rejection, "Frame rejected");
        metrics::record_scan_rejected(&rejection);
        state.last_rejection = Some(rejection);
        SmallVec::new()
    }

    fn check_in_finished(
        state: &mut ScannerState,
        attempt: &CheckInAttempt,
        ticket: u64,
        outcome: CheckInOutcome,
    ) -> Effects {
        // Timestamps can repeat across a close and reopen; the ticket cannot.
        let awaited = matches!(
            &state.phase,
            ScannerPhase::Processing { attempt: current, ticket: held }
                if *held == ticket && current == attempt
        );

        if awaited {
            Self::present(state, outcome);
        } else {
            tracing::debug!(phase = ?state.phase, outcome = outcome.label(), "Discarding late check-in result");
            metrics::record_result_discarded();
        }
        SmallVec::new()
    }

    fn present(state: &mut ScannerState, outcome: CheckInOutcome) {
        state.prompt = Some(Prompt::for_outcome(&outcome));
        state.phase = ScannerPhase::Presenting { outcome };
    }

    fn respond(
        state: &mut ScannerState,
        response: PromptResponse,
        env: &ScannerEnvironment,
    ) -> Effects {
        let offered = state.prompt.as_ref().is_some_and(|p| p.offers(response));
        let denied = matches!(state.phase, ScannerPhase::PermissionDenied { .. });
        let presenting = matches!(state.phase, ScannerPhase::Presenting { .. });

        match response {
            PromptResponse::TryAgain if denied => Self::retry_permission(state, env),
            PromptResponse::TryAgain if presenting && offered => Self::resume(state, env),
            PromptResponse::Close if denied || presenting => Self::close(state, env),
            _ => {
                tracing::debug!(phase = ?state.phase, ?response, "Prompt response not applicable");
                SmallVec::new()
            },
        }
    }

    /// Release the lock and go back to scanning, restarting the camera if it
    /// never came up
    fn resume(state: &mut ScannerState, env: &ScannerEnvironment) -> Effects {
        let token = state.lock.release();
        state.prompt = None;
        state.last_rejection = None;

        let cooldown = delay! {
            duration: env.cooldown,
            action: ScannerAction::CooldownElapsed { token }
        };

        if state.camera_live {
            state.phase = ScannerPhase::Scanning;
            smallvec![cooldown]
        } else {
            state.phase = ScannerPhase::Ready;
            smallvec![Effect::merge(vec![cooldown, Self::start_camera(env)])]
        }
    }

    fn close(state: &mut ScannerState, env: &ScannerEnvironment) -> Effects {
        if state.phase == ScannerPhase::Closed {
            return SmallVec::new();
        }

        tracing::info!(dispatched = state.dispatched, "Scanner closed");
        state.phase = ScannerPhase::Closed;
        state.lock.reset();
        state.prompt = None;
        let torch_was_on = std::mem::take(&mut state.torch_on);

        if !state.camera_live {
            return SmallVec::new();
        }
        state.camera_live = false;

        if torch_was_on {
            // Torch off before the device is released.
            smallvec![Effect::chain(vec![
                Self::set_torch(env, false),
                Self::stop_camera(env),
            ])]
        } else {
            smallvec![Self::stop_camera(env)]
        }
    }

    fn toggle_torch(state: &mut ScannerState, env: &ScannerEnvironment) -> Effects {
        if !state.camera_live || state.phase == ScannerPhase::Closed {
            return SmallVec::new();
        }

        state.torch_on = !state.torch_on;
        smallvec![Self::set_torch(env, state.torch_on)]
    }
}

impl Reducer for ScannerReducer {
    type State = ScannerState;
    type Action = ScannerAction;
    type Environment = ScannerEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            ScannerAction::Open { user_id } => Self::open(state, user_id, env),
            ScannerAction::PermissionResolved(status) => {
                Self::permission_resolved(state, status, env)
            },
            ScannerAction::RetryPermission => Self::retry_permission(state, env),
            ScannerAction::CameraStarted => Self::camera_started(state, env),
            ScannerAction::CameraFailed { error } => Self::camera_failed(state, &error),
            ScannerAction::FrameDecoded(frame) => Self::frame_decoded(state, frame, env),
            ScannerAction::CheckInFinished {
                attempt,
                ticket,
                outcome,
            } => Self::check_in_finished(state, &attempt, ticket, outcome),
            ScannerAction::RespondToPrompt(response) => Self::respond(state, response, env),
            ScannerAction::Close => Self::close(state, env),
            ScannerAction::CooldownElapsed { token } => {
                if state.lock.expire_cooldown(token) {
                    tracing::trace!(generation = token.generation(), "Cooldown over");
                }
                SmallVec::new()
            },
            ScannerAction::ToggleTorch => Self::toggle_torch(state, env),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use crate::camera::{CameraCall, ScriptedCamera};
    use crate::haptics::CountingHaptics;
    use crate::memory::InMemoryCheckInService;
    use crate::prompt::PromptKind;
    use crate::validator::PayloadFormat;
    use rollcall_core::environment::Clock;
    use rollcall_testing::{ManualClock, ReducerTest, assertions, test_clock};

    fn env_with(camera: &ScriptedCamera) -> ScannerEnvironment {
        env_with_clock(camera, Arc::new(test_clock()))
    }

    fn env_with_clock(camera: &ScriptedCamera, clock: Arc<dyn Clock>) -> ScannerEnvironment {
        let service = InMemoryCheckInService::with_events([("evt_12345", "Spring Mixer")]);
        let dispatcher = Dispatcher::new(Arc::new(service), clock, PayloadFormat::default());
        ScannerEnvironment::new(
            dispatcher,
            Arc::new(camera.clone()),
            Arc::new(CountingHaptics::new()),
        )
    }

    fn env() -> ScannerEnvironment {
        env_with(&ScriptedCamera::granted())
    }

    fn user() -> UserId {
        UserId::new("u-1")
    }

    fn attempt(event: &str) -> CheckInAttempt {
        CheckInAttempt {
            event_id: EventId::new(event),
            user_id: user(),
            timestamp: test_clock().now(),
        }
    }

    fn processing(event: &str) -> ScannerState {
        let mut state = ScannerState::scanning(user());
        assert!(state.lock.acquire(event));
        state.phase = ScannerPhase::Processing {
            attempt: attempt(event),
            ticket: state.lock.generation(),
        };
        state
    }

    /// Ticket held by a state built with [`processing`]
    const FIRST_TICKET: u64 = 1;

    fn presenting(event: &str, outcome: CheckInOutcome) -> ScannerState {
        let mut state = processing(event);
        ScannerReducer::present(&mut state, outcome);
        state
    }

    /// Run the first `Future` among `effects` and return what it feeds back
    async fn run_future(effects: SmallVec<[Effect<ScannerAction>; 4]>) -> Option<ScannerAction> {
        for effect in effects {
            if let Effect::Future(fut) = effect {
                return fut.await;
            }
        }
        None
    }

    #[test]
    fn test_open_requests_permission() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(ScannerState::new())
            .when_action(ScannerAction::Open { user_id: user() })
            .then_state(|s| {
                assert_eq!(s.phase, ScannerPhase::PermissionPending);
                assert_eq!(s.user_id, Some(user()));
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_open_twice_is_ignored() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(ScannerState::scanning(user()))
            .when_action(ScannerAction::Open {
                user_id: UserId::new("u-2"),
            })
            .then_state(|s| {
                assert_eq!(s.phase, ScannerPhase::Scanning);
                assert_eq!(s.user_id, Some(user()));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_permission_granted_starts_camera() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(ScannerState::new())
            .when_actions([
                ScannerAction::Open { user_id: user() },
                ScannerAction::PermissionResolved(PermissionStatus::GRANTED),
            ])
            .then_state(|s| assert_eq!(s.phase, ScannerPhase::Ready))
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn test_permission_denied_then_granted_on_retry() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(ScannerState::new())
            .when_actions([
                ScannerAction::Open { user_id: user() },
                ScannerAction::PermissionResolved(PermissionStatus::DENIED),
            ])
            .then_state(|s| {
                assert_eq!(
                    s.phase,
                    ScannerPhase::PermissionDenied {
                        can_ask_again: true
                    }
                );
                assert_eq!(
                    s.prompt.as_ref().map(|p| p.kind),
                    Some(PromptKind::PermissionDenied)
                );
            })
            .then_effects(assertions::assert_no_effects)
            .run();

        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(ScannerState::new())
            .when_actions([
                ScannerAction::Open { user_id: user() },
                ScannerAction::PermissionResolved(PermissionStatus::DENIED),
                ScannerAction::RetryPermission,
                ScannerAction::PermissionResolved(PermissionStatus::GRANTED),
            ])
            .then_state(|s| {
                assert_eq!(s.phase, ScannerPhase::Ready);
                assert!(s.prompt.is_none());
            })
            .run();
    }

    #[test]
    fn test_blocked_permission_can_still_be_retried() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(ScannerState::new())
            .when_actions([
                ScannerAction::Open { user_id: user() },
                ScannerAction::PermissionResolved(PermissionStatus::BLOCKED),
                ScannerAction::RespondToPrompt(PromptResponse::TryAgain),
            ])
            .then_state(|s| assert_eq!(s.phase, ScannerPhase::PermissionPending))
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn test_camera_started_goes_live() {
        let mut state = ScannerState::new();
        state.user_id = Some(user());
        state.phase = ScannerPhase::Ready;

        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(ScannerAction::CameraStarted)
            .then_state(|s| {
                assert_eq!(s.phase, ScannerPhase::Scanning);
                assert!(s.camera_live);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_accepted_frame_locks_in_same_step() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(ScannerState::scanning(user()))
            .when_action(ScannerAction::FrameDecoded(DecodeEvent::qr("evt_12345")))
            .then_state(|s| {
                assert!(s.lock.is_locked());
                assert_eq!(s.lock.last_seen(), Some("evt_12345"));
                assert_eq!(s.dispatched, 1);
                assert!(matches!(
                    &s.phase,
                    ScannerPhase::Processing { attempt, .. } if attempt.event_id.as_str() == "evt_12345"
                ));
            })
            .then_effects(|effects| {
                // Haptic impulse and the remote call.
                assert_eq!(assertions::count_futures(effects), 2);
            })
            .run();
    }

    #[test]
    fn test_second_identical_frame_is_duplicate() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(ScannerState::scanning(user()))
            .when_actions([
                ScannerAction::FrameDecoded(DecodeEvent::qr("evt_12345")),
                ScannerAction::FrameDecoded(DecodeEvent::qr("evt_12345")),
            ])
            .then_state(|s| {
                assert_eq!(s.dispatched, 1);
                assert_eq!(s.last_rejection, Some(ScanRejection::DuplicateScan));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_different_frame_while_processing_is_locked() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(processing("evt_12345"))
            .when_action(ScannerAction::FrameDecoded(DecodeEvent::qr("evt_other")))
            .then_state(|s| {
                assert!(s.is_processing());
                assert_eq!(s.last_rejection, Some(ScanRejection::Locked));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_empty_payload_never_dispatches() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(ScannerState::scanning(user()))
            .when_action(ScannerAction::FrameDecoded(DecodeEvent::qr("")))
            .then_state(|s| {
                assert_eq!(s.phase, ScannerPhase::Scanning);
                assert!(!s.lock.is_locked());
                assert_eq!(s.dispatched, 0);
                assert_eq!(s.last_rejection, Some(ScanRejection::EmptyPayload));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_non_qr_barcode_is_ignored() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(ScannerState::scanning(user()))
            .when_action(ScannerAction::FrameDecoded(DecodeEvent::other(
                "ean13",
                "4006381333931",
            )))
            .then_state(|s| {
                assert!(matches!(
                    s.last_rejection,
                    Some(ScanRejection::UnsupportedBarcode { .. })
                ));
                assert!(!s.lock.is_locked());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_frame_before_camera_is_live() {
        let mut state = ScannerState::new();
        state.phase = ScannerPhase::Ready;
        state.user_id = Some(user());

        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(ScannerAction::FrameDecoded(DecodeEvent::qr("evt_12345")))
            .then_state(|s| assert_eq!(s.last_rejection, Some(ScanRejection::NotScanning)))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_result_is_presented() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(processing("evt_12345"))
            .when_action(ScannerAction::CheckInFinished {
                attempt: attempt("evt_12345"),
                ticket: FIRST_TICKET,
                outcome: CheckInOutcome::AlreadyCheckedIn,
            })
            .then_state(|s| {
                assert_eq!(s.outcome(), Some(&CheckInOutcome::AlreadyCheckedIn));
                assert_eq!(
                    s.prompt.as_ref().map(|p| p.kind),
                    Some(PromptKind::AlreadyCheckedIn)
                );
                // Lock stays held while the outcome is on screen.
                assert!(s.lock.is_locked());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_result_for_other_attempt_is_discarded() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(processing("evt_12345"))
            .when_action(ScannerAction::CheckInFinished {
                attempt: attempt("evt_stale"),
                ticket: FIRST_TICKET,
                outcome: CheckInOutcome::InvalidEvent,
            })
            .then_state(|s| assert!(s.is_processing()))
            .run();
    }

    #[test]
    fn test_result_after_close_is_discarded() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(processing("evt_12345"))
            .when_actions([
                ScannerAction::Close,
                ScannerAction::CheckInFinished {
                    attempt: attempt("evt_12345"),
                    ticket: FIRST_TICKET,
                    outcome: CheckInOutcome::Success {
                        event_name: "Spring Mixer".into(),
                    },
                },
            ])
            .then_state(|s| {
                assert_eq!(s.phase, ScannerPhase::Closed);
                assert!(s.prompt.is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_result_from_before_reopen_is_discarded() {
        // The clock never moves, so both attempts carry the same timestamp.
        let clock = Arc::new(ManualClock::new(test_clock().now()));
        let env = env_with_clock(&ScriptedCamera::granted(), clock.clone());
        let reducer = ScannerReducer::new();
        let mut state = ScannerState::scanning(user());

        let frame = || ScannerAction::FrameDecoded(DecodeEvent::qr("evt_12345"));
        let current = |state: &ScannerState| match &state.phase {
            ScannerPhase::Processing { attempt, ticket } => Some((attempt.clone(), *ticket)),
            _ => None,
        };

        let _ = reducer.reduce(&mut state, frame(), &env);
        let (stale_attempt, stale_ticket) = current(&state).unwrap();
        let stale_timestamp = stale_attempt.timestamp;

        for action in [
            ScannerAction::Close,
            ScannerAction::Open { user_id: user() },
            ScannerAction::PermissionResolved(PermissionStatus::GRANTED),
            ScannerAction::CameraStarted,
            frame(),
        ] {
            let _ = reducer.reduce(&mut state, action, &env);
        }
        let (attempt, ticket) = current(&state).unwrap();

        assert_eq!(attempt, stale_attempt);
        assert_ne!(ticket, stale_ticket);

        let _ = reducer.reduce(
            &mut state,
            ScannerAction::CheckInFinished {
                attempt: stale_attempt,
                ticket: stale_ticket,
                outcome: CheckInOutcome::NetworkError {
                    message: "timed out".into(),
                },
            },
            &env,
        );
        assert!(state.is_processing());

        let _ = reducer.reduce(
            &mut state,
            ScannerAction::CheckInFinished {
                attempt,
                ticket,
                outcome: CheckInOutcome::AlreadyCheckedIn,
            },
            &env,
        );
        assert_eq!(state.outcome(), Some(&CheckInOutcome::AlreadyCheckedIn));

        // Once the clock moves, a later attempt is stamped later.
        clock.advance(chrono::Duration::seconds(5));
        let _ = reducer.reduce(
            &mut state,
            ScannerAction::RespondToPrompt(PromptResponse::TryAgain),
            &env,
        );
        let _ = reducer.reduce(
            &mut state,
            ScannerAction::FrameDecoded(DecodeEvent::qr("evt_other")),
            &env,
        );
        let (later, _) = current(&state).unwrap();
        assert!(later.timestamp > stale_timestamp);
    }

    #[test]
    fn test_try_again_releases_lock_and_schedules_cooldown() {
        let env = env();
        let cooldown = env.cooldown;

        ReducerTest::new(ScannerReducer::new())
            .with_env(env)
            .given_state(presenting(
                "evt_12345",
                CheckInOutcome::NetworkError {
                    message: "offline".into(),
                },
            ))
            .when_action(ScannerAction::RespondToPrompt(PromptResponse::TryAgain))
            .then_state(|s| {
                assert_eq!(s.phase, ScannerPhase::Scanning);
                assert!(!s.lock.is_locked());
                assert_eq!(s.lock.last_seen(), Some("evt_12345"));
                assert!(s.prompt.is_none());
            })
            .then_effects(move |effects| {
                let (duration, action) = assertions::find_delay(effects).unwrap();
                assert_eq!(duration, cooldown);
                assert!(matches!(action, ScannerAction::CooldownElapsed { .. }));
            })
            .run();
    }

    #[test]
    fn test_same_code_blocked_until_cooldown_elapses() {
        let mut state = presenting(
            "evt_12345",
            CheckInOutcome::NetworkError {
                message: "offline".into(),
            },
        );
        let env = env();
        let reducer = ScannerReducer::new();

        let effects = reducer.reduce(
            &mut state,
            ScannerAction::RespondToPrompt(PromptResponse::TryAgain),
            &env,
        );
        let (_, elapsed) = assertions::find_delay(&effects).unwrap();
        let elapsed = elapsed.clone();

        let _ = reducer.reduce(
            &mut state,
            ScannerAction::FrameDecoded(DecodeEvent::qr("evt_12345")),
            &env,
        );
        assert_eq!(state.last_rejection, Some(ScanRejection::DuplicateScan));
        assert_eq!(state.phase, ScannerPhase::Scanning);

        let _ = reducer.reduce(&mut state, elapsed, &env);
        let _ = reducer.reduce(
            &mut state,
            ScannerAction::FrameDecoded(DecodeEvent::qr("evt_12345")),
            &env,
        );
        assert!(state.is_processing());
    }

    #[test]
    fn test_success_does_not_offer_try_again() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(presenting(
                "evt_12345",
                CheckInOutcome::Success {
                    event_name: "Spring Mixer".into(),
                },
            ))
            .when_action(ScannerAction::RespondToPrompt(PromptResponse::TryAgain))
            .then_state(|s| {
                assert!(s.outcome().is_some_and(CheckInOutcome::is_success));
                assert!(s.lock.is_locked());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_close_from_prompt_stops_camera() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(presenting(
                "evt_12345",
                CheckInOutcome::Success {
                    event_name: "Spring Mixer".into(),
                },
            ))
            .when_action(ScannerAction::RespondToPrompt(PromptResponse::Close))
            .then_state(|s| {
                assert_eq!(s.phase, ScannerPhase::Closed);
                assert!(!s.camera_live);
                assert!(!s.lock.is_locked());
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn test_close_with_torch_on_switches_it_off_first() {
        let mut state = ScannerState::scanning(user());
        state.torch_on = true;

        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(ScannerAction::Close)
            .then_state(|s| {
                assert_eq!(s.phase, ScannerPhase::Closed);
                assert!(!s.torch_on);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assert!(matches!(&effects[0], Effect::Sequential(steps) if steps.len() == 2));
            })
            .run();
    }

    #[test]
    fn test_torch_only_toggles_with_live_camera() {
        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(ScannerState::new())
            .when_action(ScannerAction::ToggleTorch)
            .then_state(|s| assert!(!s.torch_on))
            .then_effects(assertions::assert_no_effects)
            .run();

        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(ScannerState::scanning(user()))
            .when_action(ScannerAction::ToggleTorch)
            .then_state(|s| assert!(s.torch_on))
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn test_camera_failure_is_presented_and_retry_restarts() {
        let mut state = ScannerState::new();
        state.user_id = Some(user());
        state.phase = ScannerPhase::Ready;

        ReducerTest::new(ScannerReducer::new())
            .with_env(env())
            .given_state(state)
            .when_actions([
                ScannerAction::CameraFailed {
                    error: CameraError::Unavailable("in use".into()),
                },
                ScannerAction::RespondToPrompt(PromptResponse::TryAgain),
            ])
            .then_state(|s| {
                assert_eq!(s.phase, ScannerPhase::Ready);
                assert!(!s.camera_live);
            })
            .then_effects(|effects| {
                assertions::assert_has_future_effect(effects);
                assert!(assertions::find_delay(effects).is_some());
            })
            .run();
    }

    #[tokio::test]
    async fn test_effects_call_the_ports() {
        let camera = ScriptedCamera::granted();
        let env = env_with(&camera);
        let reducer = ScannerReducer::new();
        let mut state = ScannerState::new();

        let effects = reducer.reduce(&mut state, ScannerAction::Open { user_id: user() }, &env);
        let resolved = run_future(effects).await.unwrap();
        assert_eq!(resolved, ScannerAction::PermissionResolved(PermissionStatus::GRANTED));

        let effects = reducer.reduce(&mut state, resolved, &env);
        let started = run_future(effects).await.unwrap();
        assert_eq!(started, ScannerAction::CameraStarted);

        let _ = reducer.reduce(&mut state, started, &env);
        let effects = reducer.reduce(
            &mut state,
            ScannerAction::FrameDecoded(DecodeEvent::qr("evt_12345")),
            &env,
        );

        let mut finished = None;
        for effect in effects {
            if let Effect::Future(fut) = effect
                && let Some(action) = fut.await
            {
                finished = Some(action);
            }
        }
        let finished = finished.unwrap();
        assert!(matches!(
            &finished,
            ScannerAction::CheckInFinished { outcome, .. } if outcome.is_success()
        ));

        let _ = reducer.reduce(&mut state, finished, &env);
        assert_eq!(
            state.prompt.as_ref().map(|p| p.kind),
            Some(PromptKind::Success)
        );
        assert_eq!(
            camera.calls(),
            vec![CameraCall::RequestPermission, CameraCall::Start]
        );
    }
}
