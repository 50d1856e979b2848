//! Camera port: permission, preview lifecycle and torch.
//!
//! Decoded frames do not come back through this trait. The platform layer
//! delivers them as `ScannerAction::FrameDecoded` so they are serialized with
//! everything else the scanner reacts to.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Barcode symbology reported with a decoded frame
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarcodeKind {
    /// QR code, the only kind event codes use
    Qr,
    /// Anything else the decoder recognised
    Other(String),
}

impl fmt::Display for BarcodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Qr => f.write_str("qr"),
            Self::Other(kind) => f.write_str(kind),
        }
    }
}

/// One decode callback from the camera
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeEvent {
    /// Symbology
    pub kind: BarcodeKind,
    /// Raw decoded payload
    pub data: String,
}

impl DecodeEvent {
    /// A decoded QR code
    #[must_use]
    pub fn qr(data: impl Into<String>) -> Self {
        Self {
            kind: BarcodeKind::Qr,
            data: data.into(),
        }
    }

    /// A decoded barcode of another symbology
    #[must_use]
    pub fn other(kind: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind: BarcodeKind::Other(kind.into()),
            data: data.into(),
        }
    }
}

/// Answer to a camera permission request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionStatus {
    /// Camera access allowed
    pub granted: bool,
    /// Whether the OS will show the prompt again if asked
    pub can_ask_again: bool,
}

impl PermissionStatus {
    /// Access allowed
    pub const GRANTED: Self = Self {
        granted: true,
        can_ask_again: true,
    };

    /// Access refused, the OS may prompt again
    pub const DENIED: Self = Self {
        granted: false,
        can_ask_again: true,
    };

    /// Access refused permanently; only system settings can change it
    pub const BLOCKED: Self = Self {
        granted: false,
        can_ask_again: false,
    };
}

/// Camera hardware failures
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum CameraError {
    /// The device could not be opened
    #[error("camera unavailable: {0}")]
    Unavailable(String),

    /// Access was revoked while the preview was running
    #[error("camera permission revoked")]
    PermissionRevoked,
}

/// Future returned by [`Camera::request_permission`]
pub type PermissionFuture = Pin<Box<dyn Future<Output = PermissionStatus> + Send>>;

/// Future returned by the camera's device operations
pub type DeviceFuture = Pin<Box<dyn Future<Output = Result<(), CameraError>> + Send>>;

/// The device camera
pub trait Camera: Send + Sync {
    /// Ask the OS for camera access
    fn request_permission(&self) -> PermissionFuture;

    /// Start the preview and decoding
    ///
    /// # Errors
    ///
    /// Returns [`CameraError`] if the device cannot be started.
    fn start(&self) -> DeviceFuture;

    /// Stop the preview and release the device
    ///
    /// # Errors
    ///
    /// Returns [`CameraError`] if the device reports a failure while stopping.
    fn stop(&self) -> DeviceFuture;

    /// Switch the torch on or off
    ///
    /// # Errors
    ///
    /// Returns [`CameraError`] if the device has no torch or is not running.
    fn set_torch(&self, on: bool) -> DeviceFuture;
}

/// Something the scripted camera was asked to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraCall {
    /// `request_permission`
    RequestPermission,
    /// `start`
    Start,
    /// `stop`
    Stop,
    /// `set_torch`
    Torch(bool),
}

#[derive(Debug)]
struct Script {
    permissions: VecDeque<PermissionStatus>,
    fallback: PermissionStatus,
    start_failures: VecDeque<CameraError>,
    calls: Vec<CameraCall>,
}

/// Camera that answers from a script and records every call
///
/// Permission answers are consumed in order; once the queue is empty every
/// request gets the fallback. Used by tests and by the console harness, which
/// has no real device.
#[derive(Clone, Debug)]
pub struct ScriptedCamera {
    script: Arc<Mutex<Script>>,
}

impl ScriptedCamera {
    /// Camera whose permission requests always succeed
    #[must_use]
    pub fn granted() -> Self {
        Self::with_fallback(PermissionStatus::GRANTED)
    }

    /// Camera that answers `answers` in order, then `fallback`
    #[must_use]
    pub fn with_permissions(
        answers: impl IntoIterator<Item = PermissionStatus>,
        fallback: PermissionStatus,
    ) -> Self {
        let camera = Self::with_fallback(fallback);
        camera.lock().permissions.extend(answers);
        camera
    }

    fn with_fallback(fallback: PermissionStatus) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                permissions: VecDeque::new(),
                fallback,
                start_failures: VecDeque::new(),
                calls: Vec::new(),
            })),
        }
    }

    /// Make the next `start` fail with `error`
    pub fn fail_next_start(&self, error: CameraError) {
        self.lock().start_failures.push_back(error);
    }

    /// Every call received, oldest first
    #[must_use]
    pub fn calls(&self) -> Vec<CameraCall> {
        self.lock().calls.clone()
    }

    /// Number of times `call` was received
    #[must_use]
    pub fn count(&self, call: CameraCall) -> usize {
        self.lock().calls.iter().filter(|c| **c == call).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: CameraCall) {
        self.lock().calls.push(call);
    }
}

impl Camera for ScriptedCamera {
    fn request_permission(&self) -> PermissionFuture {
        let status = {
            let mut script = self.lock();
            script.calls.push(CameraCall::RequestPermission);
            let fallback = script.fallback;
            script.permissions.pop_front().unwrap_or(fallback)
        };
        Box::pin(async move { status })
    }

    fn start(&self) -> DeviceFuture {
        let result = {
            let mut script = self.lock();
            script.calls.push(CameraCall::Start);
            script.start_failures.pop_front().map_or(Ok(()), Err)
        };
        Box::pin(async move { result })
    }

    fn stop(&self) -> DeviceFuture {
        self.record(CameraCall::Stop);
        Box::pin(async { Ok(()) })
    }

    fn set_torch(&self, on: bool) -> DeviceFuture {
        self.record(CameraCall::Torch(on));
        Box::pin(async { Ok(()) })
    }
}
