//! crates/terminal_pos_core/src/terminal.rs
//!
//! Session-scoped terminal selection. The selected reader id is validated
//! against the platform before it is stored, and re-validated on every read;
//! a selection the platform can no longer confirm is dropped.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{Reader, SessionId};
use crate::error::{PosError, PosResult};
use crate::ports::{PaymentPlatform, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStatus {
    Selected,
    NoneSelected,
    Cleared,
}

/// The outcome of a selection read or write.
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub reader_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reader: Option<Reader>,
    pub status: SelectionStatus,
}

#[derive(Clone)]
pub struct TerminalSelector {
    platform: Arc<dyn PaymentPlatform>,
    sessions: Arc<dyn SessionStore>,
}

impl TerminalSelector {
    pub fn new(platform: Arc<dyn PaymentPlatform>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { platform, sessions }
    }

    /// Confirms the reader exists and stores it as the session's selection.
    pub async fn select(&self, session: &SessionId, reader_id: &str) -> PosResult<Selection> {
        let reader_id = reader_id.trim();
        if reader_id.is_empty() {
            return Err(PosError::Validation("reader_id is required".to_string()));
        }

        self.platform.retrieve_reader(reader_id).await?;

        self.sessions
            .set_selected_reader(session, Some(reader_id))
            .await
            .map_err(|e| PosError::Session(e.to_string()))?;

        info!("Selected terminal reader: {}", reader_id);
        Ok(Selection {
            reader_id: Some(reader_id.to_string()),
            reader: None,
            status: SelectionStatus::Selected,
        })
    }

    /// Returns the session's selection after re-validating it with the platform.
    pub async fn selected(&self, session: &SessionId) -> PosResult<Selection> {
        let Some(reader_id) = self.stored(session).await? else {
            return Ok(Selection {
                reader_id: None,
                reader: None,
                status: SelectionStatus::NoneSelected,
            });
        };

        match self.platform.retrieve_reader(&reader_id).await {
            Ok(reader) => Ok(Selection {
                reader_id: Some(reader_id),
                reader: Some(reader),
                status: SelectionStatus::Selected,
            }),
            Err(e) => {
                warn!("Selected reader {} could not be confirmed: {}", reader_id, e);
                self.sessions
                    .set_selected_reader(session, None)
                    .await
                    .map_err(|e| PosError::Session(e.to_string()))?;
                Err(PosError::NotFound(
                    "Selected reader no longer exists".to_string(),
                ))
            }
        }
    }

    pub async fn clear(&self, session: &SessionId) -> PosResult<Selection> {
        self.sessions
            .set_selected_reader(session, None)
            .await
            .map_err(|e| PosError::Session(e.to_string()))?;

        info!("Terminal selection cleared from session {}", session);
        Ok(Selection {
            reader_id: None,
            reader: None,
            status: SelectionStatus::Cleared,
        })
    }

    /// The stored reader id, without asking the platform.
    pub async fn require_selected(&self, session: &SessionId) -> PosResult<String> {
        self.stored(session).await?.ok_or(PosError::NoReaderSelected)
    }

    async fn stored(&self, session: &SessionId) -> PosResult<Option<String>> {
        self.sessions
            .selected_reader(session)
            .await
            .map_err(|e| PosError::Session(e.to_string()))
    }
}
