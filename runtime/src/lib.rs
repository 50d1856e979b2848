//! # Rollcall Runtime
//!
//! The Store runtime that owns controller state, runs the reducer and executes
//! the effects it returns.
//!
//! ## Ordering guarantee
//!
//! Every [`Store::send`] runs the reducer while holding the state write lock
//! and never awaits inside it. Two inputs that race (two camera frames fired
//! back to back, or a frame and a network result) are therefore reduced one
//! after the other, and the second always observes whatever the first wrote.
//! Effects run afterwards on spawned Tokio tasks and re-enter through `send`.
//!
//! ## Example
//!
//! ```ignore
//! use rollcall_runtime::Store;
//!
//! let store = Store::new(ScannerState::default(), ScannerReducer::new(), env);
//!
//! store.send(ScannerAction::Open { user_id }).await?;
//! let phase = store.state(|s| s.phase.clone()).await;
//! ```

use rollcall_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

/// Metric names recorded by the runtime
pub mod metrics;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store was closed and no longer accepts actions
        ///
        /// Returned by `send()` after `close()`. Effects that were already
        /// running keep running, but their results are discarded.
        #[error("Store is closed")]
        Closed,

        /// Timed out waiting for effects or for a matching action
        #[error("Timeout waiting for store")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;
pub use store::Store;

/// Effect-produced actions buffered for `send_and_wait_for` waiters
const BROADCAST_CAPACITY: usize = 16;

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`]. Waiting on it resolves once every effect
/// spawned directly by that action has finished. Actions those effects feed
/// back get their own handles and are not waited for.
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };
        let tracking = EffectTracking {
            counter,
            notifier: tx,
        };

        (handle, tracking)
    }

    /// Number of effects from this action still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            // Every tracker is gone, so nothing can decrement any more.
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires first.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Internal: completion counter shared by the effects of one action
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: decrements the per-action counter on drop, even if the effect panics
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Internal: decrements the store-wide pending counter on drop
struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn start(counter: &Arc<AtomicUsize>) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        #[allow(clippy::cast_precision_loss)] // gauge only, counts stay tiny
        crate::metrics::gauge!(crate::metrics::EFFECTS_PENDING).set(now as f64);
        Self(Arc::clone(counter))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let now = self.0.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        #[allow(clippy::cast_precision_loss)]
        crate::metrics::gauge!(crate::metrics::EFFECTS_PENDING).set(now as f64);
    }
}

const fn effect_kind<A>(effect: &Effect<A>) -> &'static str {
    match effect {
        Effect::None => "none",
        Effect::Parallel(_) => "parallel",
        Effect::Sequential(_) => "sequential",
        Effect::Delay { .. } => "delay",
        Effect::Future(_) => "future",
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicUsize, DecrementGuard, Duration, Effect, EffectHandle,
        EffectTracking, Ordering, PendingGuard, Reducer, RwLock, StoreError,
        BROADCAST_CAPACITY, effect_kind,
    };
    use crate::metrics::{
        ACTIONS_REJECTED, ACTIONS_TOTAL, EFFECTS_EXECUTED, FEEDBACK_DISCARDED, REDUCER_DURATION,
        counter, histogram,
    };
    use std::future::Future;
    use std::pin::Pin;
    use tokio::sync::broadcast;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`; the reducer runs under the write lock)
    /// 2. Reducer (controller logic)
    /// 3. Environment (injected ports)
    /// 4. Effect execution (with feedback loop)
    ///
    /// Cloning a Store is cheap and every clone drives the same state.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        closed: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        /// Every action produced by an effect is broadcast here once it has
        /// been reduced.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                closed: Arc::clone(&self.closed),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            let (action_broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                closed: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires the write lock on state
        /// 2. Calls the reducer with (state, action, environment)
        /// 3. Releases the lock, then starts the returned effects
        ///
        /// `send()` returns once effects have been started, not finished. Use
        /// the returned [`EffectHandle`] to wait for them.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Closed`] if [`Store::close`] was called.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.closed.load(Ordering::Acquire) {
                tracing::debug!("Rejected action: store is closed");
                counter!(ACTIONS_REJECTED).increment(1);
                return Err(StoreError::Closed);
            }

            counter!(ACTIONS_TOTAL).increment(1);
            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;

                let start = std::time::Instant::now();
                let effects = self
                    .reducer
                    .reduce(&mut state, action, self.environment.as_ref());
                histogram!(REDUCER_DURATION).record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect(effect, &tracking);
            }

            Ok(handle)
        }

        /// Send an action and wait for a matching action produced by its effects
        ///
        /// Subscribes before sending, so a fast effect cannot slip past. The
        /// matching action has already been reduced when this returns.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action before `timeout`
        /// - [`StoreError::ChannelClosed`]: broadcast channel closed
        /// - [`StoreError::Closed`]: store is closed
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Read current state via a closure
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Close the store
        ///
        /// New actions are rejected. Effects already running are not
        /// cancelled; whatever they produce is dropped instead of reduced.
        pub fn close(&self) {
            if !self.closed.swap(true, Ordering::AcqRel) {
                tracing::debug!(
                    pending_effects = self.pending_effects(),
                    "Store closed"
                );
            }
        }

        /// Whether [`Store::close`] has been called
        #[must_use]
        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }

        /// Effects currently running across all actions
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::SeqCst)
        }

        /// Start an effect
        ///
        /// `None` is a no-op and `Parallel` fans out to its children. Every
        /// other effect runs on its own Tokio task.
        fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking) {
            counter!(EFFECTS_EXECUTED, "type" => effect_kind(&effect)).increment(1);

            match effect {
                Effect::None => {},
                Effect::Parallel(effects) => {
                    for effect in effects {
                        self.execute_effect(effect, tracking);
                    }
                },
                effect => {
                    tracking.increment();
                    let guard = DecrementGuard(tracking.clone());
                    let pending = PendingGuard::start(&self.pending_effects);
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = guard;
                        let _pending = pending;
                        store.run_effect(effect).await;
                    });
                },
            }
        }

        /// Run an effect to completion on the current task
        fn run_effect(&self, effect: Effect<A>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(async move {
                match effect {
                    Effect::None => {},
                    Effect::Future(fut) => {
                        if let Some(action) = fut.await {
                            self.feed_back(action).await;
                        }
                    },
                    Effect::Delay { duration, action } => {
                        tokio::time::sleep(duration).await;
                        self.feed_back(*action).await;
                    },
                    Effect::Parallel(effects) => {
                        futures::future::join_all(
                            effects.into_iter().map(|effect| self.run_effect(effect)),
                        )
                        .await;
                    },
                    Effect::Sequential(effects) => {
                        for effect in effects {
                            self.run_effect(effect).await;
                        }
                    },
                }
            })
        }

        /// Reduce an action produced by an effect, then broadcast it
        async fn feed_back(&self, action: A) {
            if self.is_closed() {
                tracing::debug!("Store closed, discarding effect result");
                counter!(FEEDBACK_DISCARDED).increment(1);
                return;
            }

            match self.send(action.clone()).await {
                Ok(_) => {
                    // No subscribers is not an error.
                    let _ = self.action_broadcast.send(action);
                },
                Err(error) => {
                    counter!(FEEDBACK_DISCARDED).increment(1);
                    tracing::debug!(%error, "Effect result not reduced");
                },
            }
        }
    }
}
