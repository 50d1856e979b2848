//! Declarative macros for ergonomic effect construction
//!
//! Reducers in the check-in flow mostly return two kinds of effect: an async
//! call into a port (backend, camera, haptics) and a timer. These macros keep
//! those call sites short.

/// Create an `Effect::Future` from an async block
///
/// The block evaluates to `Option<Action>`; `Some` is fed back into the
/// reducer, `None` ends the effect silently.
///
/// # Example
///
/// ```rust,ignore
/// use rollcall_core::async_effect;
///
/// async_effect! {
///     let status = camera.request_permission().await;
///     Some(ScannerAction::PermissionResolved { status })
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use rollcall_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_millis(2000),
///     action: ScannerAction::CooldownElapsed { token }
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

/// Create a fire-and-forget `Effect::Future` that never feeds back an action
///
/// # Example
///
/// ```rust,ignore
/// use rollcall_core::fire_and_forget;
///
/// fire_and_forget! { haptics.impact(); }
/// ```
#[macro_export]
macro_rules! fire_and_forget {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move {
                $($body)*
                None
            })
        )
    };
}
