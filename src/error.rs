//! ==============================================================================
//! error.rs - error taxonomy of the controller
//! ==============================================================================
//!
//! purpose:
//!     every variant is recovered at the action boundary: it ends up in the
//!     activity log and the status banner, never as a crash. nothing is retried
//!     automatically.
//!
//! relationships:
//!     - produced by: service.rs (Transport, from reqwest), controller.rs
//!       (Rejected, LocalValidation)
//!     - consumed by: controller.rs (log + banner), console.rs (tracing)
//!
//! ==============================================================================

use crate::domain::Position;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// network failure, timeout, non-2xx or undecodable reply
    #[error("{message}")]
    Transport { message: String },

    /// the service answered `success: false`
    #[error("{message}")]
    Rejected { position: Position, message: String },

    /// caught locally, no request was sent
    #[error("{reason}")]
    LocalValidation { position: Position, reason: String },
}

impl ControlError {
    pub fn transport(message: impl Into<String>) -> Self {
        ControlError::Transport { message: message.into() }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ControlError::LocalValidation { .. })
    }
}

impl From<reqwest::Error> for ControlError {
    fn from(e: reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            format!("request timed out: {}", e)
        } else {
            e.to_string()
        };
        ControlError::Transport { message }
    }
}
