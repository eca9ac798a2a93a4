//! crates/terminal_pos_core/src/error.rs
//!
//! Errors surfaced by the workflows to the HTTP layer.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum PosError {
    /// Missing or malformed caller input.
    #[error("{0}")]
    Validation(String),

    #[error("No terminal reader selected. Please select a reader first.")]
    NoReaderSelected,

    /// A stale reference or a result that does not exist yet.
    #[error("{0}")]
    NotFound(String),

    /// The session store failed; fatal for the current request only.
    #[error("Session store failure: {0}")]
    Session(String),

    /// The payment platform rejected or failed the call.
    #[error("{0}")]
    Platform(#[from] PortError),
}

pub type PosResult<T> = Result<T, PosError>;
