//! Scan validation: decides whether a decoded QR payload may start a check-in.
//!
//! Pure functions only. The caller passes in the lock state it owns, so the
//! check and the subsequent `ScanLock::acquire` can happen in one reducer
//! step.

use crate::types::EventId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default provider prefixes stripped from payloads, longest first
pub const DEFAULT_PREFIXES: [&str; 3] = ["rollcall://event/", "rollcall:", "event:"];

/// Default upper bound on identifier length, in characters
pub const DEFAULT_MAX_IDENTIFIER_LEN: usize = 128;

/// Why a decoded frame did not start a check-in
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanRejection {
    /// Same payload as the last accepted scan, still inside its cooldown
    #[error("duplicate scan")]
    DuplicateScan,

    /// An attempt is in flight or its outcome is on screen
    #[error("scanner is locked")]
    Locked,

    /// Payload is empty or whitespace
    #[error("empty payload")]
    EmptyPayload,

    /// Payload does not normalize to a usable identifier
    #[error("malformed payload: {reason}")]
    Malformed {
        /// What was wrong with it
        reason: String,
    },

    /// Barcode symbology other than QR
    #[error("unsupported barcode type {kind}")]
    UnsupportedBarcode {
        /// Symbology reported by the camera
        kind: String,
    },

    /// Frame arrived while the camera was not live
    #[error("scanner is not scanning")]
    NotScanning,
}

impl ScanRejection {
    /// Short stable name, used as a metric label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::DuplicateScan => "duplicate_scan",
            Self::Locked => "locked",
            Self::EmptyPayload => "empty_payload",
            Self::Malformed { .. } => "malformed",
            Self::UnsupportedBarcode { .. } => "unsupported_barcode",
            Self::NotScanning => "not_scanning",
        }
    }

    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// How event identifiers are encoded in QR payloads
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadFormat {
    prefixes: Vec<String>,
    max_len: usize,
}

impl PayloadFormat {
    /// Build a format from provider prefixes and a length bound
    ///
    /// Prefixes are matched case-insensitively, longest first. Empty prefixes
    /// are ignored.
    #[must_use]
    pub fn new<I, P>(prefixes: I, max_len: usize) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut prefixes: Vec<String> = prefixes
            .into_iter()
            .map(Into::into)
            .filter(|p| !p.is_empty())
            .collect();
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()));
        prefixes.dedup();

        Self { prefixes, max_len }
    }

    /// Recognised prefixes, longest first
    #[must_use]
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Maximum identifier length in characters
    #[must_use]
    pub const fn max_len(&self) -> usize {
        self.max_len
    }

    fn strip_prefix<'a>(&self, payload: &'a str) -> &'a str {
        for prefix in &self.prefixes {
            if let Some(head) = payload.get(..prefix.len())
                && head.eq_ignore_ascii_case(prefix)
            {
                return payload.get(prefix.len()..).unwrap_or_default();
            }
        }
        payload
    }
}

impl Default for PayloadFormat {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIXES, DEFAULT_MAX_IDENTIFIER_LEN)
    }
}

/// Turn a raw payload into an event identifier
///
/// Trims, strips one provider prefix, then checks what is left.
///
/// # Errors
///
/// [`ScanRejection::EmptyPayload`] for blank input,
/// [`ScanRejection::Malformed`] when nothing usable remains.
pub fn normalize(raw: &str, format: &PayloadFormat) -> Result<EventId, ScanRejection> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ScanRejection::EmptyPayload);
    }

    let identifier = format.strip_prefix(trimmed).trim();

    if identifier.is_empty() {
        return Err(ScanRejection::malformed("no identifier after prefix"));
    }
    if identifier.chars().count() > format.max_len() {
        return Err(ScanRejection::malformed(format!(
            "identifier longer than {} characters",
            format.max_len()
        )));
    }
    if identifier
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(ScanRejection::malformed(
            "identifier contains whitespace or control characters",
        ));
    }

    Ok(EventId::new(identifier))
}

/// Decide whether a decoded frame may start a check-in
///
/// Checks run in this order: duplicate of `last_seen`, lock held, blank
/// payload, malformed identifier. A repeat frame of the code currently being
/// processed therefore reports `DuplicateScan` rather than `Locked`.
///
/// # Errors
///
/// The first [`ScanRejection`] that applies.
pub fn validate(
    raw: &str,
    last_seen: Option<&str>,
    is_locked: bool,
    format: &PayloadFormat,
) -> Result<EventId, ScanRejection> {
    if last_seen == Some(raw) {
        return Err(ScanRejection::DuplicateScan);
    }
    if is_locked {
        return Err(ScanRejection::Locked);
    }
    normalize(raw, format)
}
