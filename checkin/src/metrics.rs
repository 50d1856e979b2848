//! Check-in metrics.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `checkin.scans.accepted` - Frames that acquired the scan lock
//! - `checkin.scans.rejected{reason}` - Frames turned away by the validator
//! - `checkin.attempts.dispatched` - Remote check-in calls made
//! - `checkin.outcomes{outcome}` - Classified results
//! - `checkin.results.discarded` - Results that arrived after the scanner moved on
//!
//! ## Histograms
//! - `checkin.dispatch.duration_seconds` - Remote call latency

use crate::types::CheckInOutcome;
use crate::validator::ScanRejection;
use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Frames that acquired the scan lock
pub const SCANS_ACCEPTED: &str = "checkin.scans.accepted";
/// Frames rejected by the validator, labelled by `reason`
pub const SCANS_REJECTED: &str = "checkin.scans.rejected";
/// Remote check-in calls made
pub const ATTEMPTS_DISPATCHED: &str = "checkin.attempts.dispatched";
/// Classified outcomes, labelled by `outcome`
pub const OUTCOMES: &str = "checkin.outcomes";
/// Results dropped because the scanner was no longer waiting for them
pub const RESULTS_DISCARDED: &str = "checkin.results.discarded";
/// Remote call latency
pub const DISPATCH_DURATION: &str = "checkin.dispatch.duration_seconds";

/// Register descriptions for every check-in metric
pub fn describe_metrics() {
    describe_counter!(SCANS_ACCEPTED, Unit::Count, "Frames that acquired the scan lock");
    describe_counter!(
        SCANS_REJECTED,
        Unit::Count,
        "Frames rejected before dispatch, by reason"
    );
    describe_counter!(ATTEMPTS_DISPATCHED, Unit::Count, "Remote check-in calls made");
    describe_counter!(OUTCOMES, Unit::Count, "Check-in results by outcome");
    describe_counter!(
        RESULTS_DISCARDED,
        Unit::Count,
        "Check-in results that arrived after the scanner moved on"
    );
    describe_histogram!(
        DISPATCH_DURATION,
        Unit::Seconds,
        "Time taken by the remote check-in call"
    );

    rollcall_runtime::metrics::describe_metrics();
}

/// Record a frame that acquired the lock
pub fn record_scan_accepted() {
    counter!(SCANS_ACCEPTED).increment(1);
}

/// Record a frame the validator turned away
pub fn record_scan_rejected(rejection: &ScanRejection) {
    counter!(SCANS_REJECTED, "reason" => rejection.label()).increment(1);
}

/// Record one remote call and how long it took
pub fn record_dispatch(outcome: &CheckInOutcome, elapsed: Duration) {
    counter!(ATTEMPTS_DISPATCHED).increment(1);
    counter!(OUTCOMES, "outcome" => outcome.label()).increment(1);
    histogram!(DISPATCH_DURATION).record(elapsed.as_secs_f64());
}

/// Record a result nobody was waiting for
pub fn record_result_discarded() {
    counter!(RESULTS_DISCARDED).increment(1);
}
