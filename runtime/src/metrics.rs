//! Metric names and descriptions for the Store runtime.
//!
//! The runtime only records through the `metrics` facade. Installing a
//! recorder (Prometheus, statsd, an in-app debug overlay) is left to the
//! embedding application, which should call [`describe_metrics`] once after
//! doing so.

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Actions accepted by `Store::send`
pub const ACTIONS_TOTAL: &str = "store.actions.total";
/// Actions rejected because the store was closed
pub const ACTIONS_REJECTED: &str = "store.actions.rejected";
/// Effects started, labelled by `type`
pub const EFFECTS_EXECUTED: &str = "store.effects.executed";
/// Feedback actions dropped because the store closed while their effect ran
pub const FEEDBACK_DISCARDED: &str = "store.feedback.discarded";
/// Effects currently running
pub const EFFECTS_PENDING: &str = "store.effects.pending";
/// Time spent inside `Reducer::reduce`
pub const REDUCER_DURATION: &str = "store.reducer.duration_seconds";

/// Register descriptions for every runtime metric
///
/// Safe to call more than once; later calls overwrite earlier descriptions.
pub fn describe_metrics() {
    describe_counter!(ACTIONS_TOTAL, Unit::Count, "Actions reduced by the store");
    describe_counter!(
        ACTIONS_REJECTED,
        Unit::Count,
        "Actions rejected because the store was closed"
    );
    describe_counter!(EFFECTS_EXECUTED, Unit::Count, "Effects started, by effect type");
    describe_counter!(
        FEEDBACK_DISCARDED,
        Unit::Count,
        "Effect results dropped because the store closed first"
    );
    describe_gauge!(EFFECTS_PENDING, Unit::Count, "Effects currently in flight");
    describe_histogram!(
        REDUCER_DURATION,
        Unit::Seconds,
        "Wall time spent inside the reducer"
    );
}
