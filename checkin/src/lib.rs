//! # Rollcall Check-In
//!
//! The QR check-in admission flow: how a decoded QR payload becomes exactly
//! one confirmed check-in.
//!
//! - [`validator`]: rejects empty, duplicate and malformed payloads
//! - [`lock`]: at most one attempt in flight, plus the duplicate cooldown
//! - [`dispatcher`]: one remote call per attempt, classified into an outcome
//! - [`scanner`]: the controller reducer tying camera, lock, backend and
//!   prompts together
//!
//! The backend, camera and haptics sit behind traits ([`CheckInService`],
//! [`Camera`], [`Haptics`]) so the flow runs the same against real devices,
//! the HTTP backend, or the in-memory doubles used in tests.
//!
//! ## Example
//!
//! ```ignore
//! use rollcall_checkin::{ScannerAction, ScannerReducer, ScannerState, DecodeEvent};
//! use rollcall_runtime::Store;
//!
//! let store = Store::new(ScannerState::new(), ScannerReducer::new(), env);
//! store.send(ScannerAction::Open { user_id }).await?;
//! store.send(ScannerAction::FrameDecoded(DecodeEvent::qr("evt_12345"))).await?;
//! ```

pub mod camera;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod haptics;
pub mod lock;
pub mod memory;
pub mod metrics;
pub mod prompt;
pub mod scanner;
pub mod types;
pub mod validator;

pub use camera::{BarcodeKind, Camera, CameraError, DecodeEvent, PermissionStatus, ScriptedCamera};
pub use client::HttpCheckInService;
pub use config::{Config, ConfigError};
pub use dispatcher::{CheckInService, Dispatcher, ServiceError};
pub use haptics::{CountingHaptics, Haptics, LogHaptics};
pub use lock::{CooldownToken, ScanLock};
pub use memory::InMemoryCheckInService;
pub use prompt::{Prompt, PromptKind, PromptResponse};
pub use scanner::{ScannerAction, ScannerEnvironment, ScannerPhase, ScannerReducer, ScannerState};
pub use types::{CheckInAttempt, CheckInOutcome, EventId, UserId};
pub use validator::{PayloadFormat, ScanRejection};
