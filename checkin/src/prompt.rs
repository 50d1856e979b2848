//! User-visible prompts for check-in outcomes and permission problems.

use crate::types::CheckInOutcome;
use serde::{Deserialize, Serialize};

/// What the member can answer to a prompt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromptResponse {
    /// Go back to scanning, or ask for camera access again
    TryAgain,
    /// Leave the scanner
    Close,
}

/// Which situation a prompt describes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptKind {
    /// Check-in recorded
    Success,
    /// Already checked in to this event
    AlreadyCheckedIn,
    /// Code does not match an event
    InvalidEvent,
    /// Backend unreachable
    NetworkError,
    /// Anything else
    Unexpected,
    /// Camera access refused
    PermissionDenied,
}

/// One button on a prompt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptAction {
    /// What pressing it sends
    pub response: PromptResponse,
    /// Button text
    pub label: String,
}

impl PromptAction {
    fn new(response: PromptResponse, label: &str) -> Self {
        Self {
            response,
            label: label.to_owned(),
        }
    }
}

/// A dialog shown to the member
///
/// The first action is the primary one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Situation
    pub kind: PromptKind,
    /// Dialog title
    pub title: String,
    /// Dialog body
    pub message: String,
    /// Buttons, primary first
    pub actions: Vec<PromptAction>,
}

impl Prompt {
    /// Prompt for a check-in outcome
    ///
    /// Success is terminal and only offers Close. Already being checked in is
    /// informational: Close is primary, scanning another code is offered
    /// second. Every failure offers Try Again first.
    #[must_use]
    pub fn for_outcome(outcome: &CheckInOutcome) -> Self {
        use PromptResponse::{Close, TryAgain};

        match outcome {
            CheckInOutcome::Success { event_name } => Self {
                kind: PromptKind::Success,
                title: "Checked in".to_owned(),
                message: format!("You're checked in to {event_name}."),
                actions: vec![PromptAction::new(Close, "Done")],
            },
            CheckInOutcome::AlreadyCheckedIn => Self {
                kind: PromptKind::AlreadyCheckedIn,
                title: "Already checked in".to_owned(),
                message: "You've already checked in to this event.".to_owned(),
                actions: vec![
                    PromptAction::new(Close, "Done"),
                    PromptAction::new(TryAgain, "Scan another code"),
                ],
            },
            CheckInOutcome::InvalidEvent => Self::failure(
                PromptKind::InvalidEvent,
                "Invalid code",
                "This QR code doesn't match an event.".to_owned(),
            ),
            CheckInOutcome::NetworkError { .. } => Self::failure(
                PromptKind::NetworkError,
                "Connection problem",
                "Couldn't reach the server. Check your connection and try again.".to_owned(),
            ),
            CheckInOutcome::Unexpected { message } => Self::failure(
                PromptKind::Unexpected,
                "Something went wrong",
                format!("Check-in failed: {message}"),
            ),
        }
    }

    /// Prompt for refused camera access
    #[must_use]
    pub fn permission_denied(can_ask_again: bool) -> Self {
        let message = if can_ask_again {
            "Camera access is needed to scan event codes."
        } else {
            "Camera access is turned off. Enable it in Settings to scan event codes."
        };

        Self {
            kind: PromptKind::PermissionDenied,
            title: "Camera access needed".to_owned(),
            message: message.to_owned(),
            actions: vec![
                PromptAction::new(PromptResponse::TryAgain, "Allow camera"),
                PromptAction::new(PromptResponse::Close, "Close"),
            ],
        }
    }

    fn failure(kind: PromptKind, title: &str, message: String) -> Self {
        Self {
            kind,
            title: title.to_owned(),
            message,
            actions: vec![
                PromptAction::new(PromptResponse::TryAgain, "Try again"),
                PromptAction::new(PromptResponse::Close, "Close"),
            ],
        }
    }

    /// Whether the prompt has a button for `response`
    #[must_use]
    pub fn offers(&self, response: PromptResponse) -> bool {
        self.actions.iter().any(|a| a.response == response)
    }

    /// The primary response
    #[must_use]
    pub fn primary(&self) -> PromptResponse {
        self.actions
            .first()
            .map_or(PromptResponse::Close, |a| a.response)
    }
}
