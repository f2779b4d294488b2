//! Customization store seam.
//!
//! DESIGN
//! ======
//! [`crate::session::BoardSession`] talks to the store only through
//! [`CustomizationRepository`], so a board can be driven against the real
//! server ([`crate::http::HttpRepository`]) or the in-process
//! [`MemoryRepository`] without code changes. Saves are per-board upserts; a
//! board carrying a `version` must match the stored one.

use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::model::{BoardCustomization, UiCustomization};

#[cfg(test)]
#[path = "repository_test.rs"]
mod tests;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Transport(String),
    /// The store answered with a non-success status.
    #[error("store returned {status}: {message}")]
    Status { status: u16, message: String },
    /// The board changed since we last read it.
    #[error("board {board_id} was modified elsewhere (expected version {expected}, found {actual})")]
    Conflict { board_id: String, expected: i64, actual: i64 },
    /// No customization document exists yet.
    #[error("customization not found")]
    NotFound,
    #[error("response decode failed: {0}")]
    Decode(String),
    #[error("invalid store URL: {0}")]
    InvalidUrl(String),
    #[error("http client build failed: {0}")]
    ClientBuild(String),
}

// =============================================================================
// TRAIT
// =============================================================================

/// Remote customization store addressed by board id.
#[async_trait::async_trait]
pub trait CustomizationRepository: Send + Sync {
    /// Fetch the whole customization document.
    ///
    /// # Errors
    ///
    /// Returns a [`RepositoryError`] if the store cannot be reached or replies
    /// with something other than a customization document.
    async fn fetch_all(&self) -> Result<UiCustomization, RepositoryError>;

    /// Fetch one board's saved layout, if any.
    ///
    /// # Errors
    ///
    /// Propagates [`CustomizationRepository::fetch_all`] failures.
    async fn load(&self, board_id: &str) -> Result<Option<BoardCustomization>, RepositoryError> {
        let doc = self.fetch_all().await?;
        Ok(doc.board(board_id).cloned())
    }

    /// Replace one board's saved layout. Returns the stored board with its new version.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Conflict`] on a version mismatch, or another
    /// variant if the write fails.
    async fn save(&self, board_id: &str, board: &BoardCustomization) -> Result<BoardCustomization, RepositoryError>;

    /// Remove one board's saved layout.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] if no document exists, or another
    /// variant if the delete fails.
    async fn delete(&self, board_id: &str) -> Result<(), RepositoryError>;
}

// =============================================================================
// VERSIONING
// =============================================================================

/// Accept a write when the caller sent no version or the versions match.
///
/// # Errors
///
/// Returns [`RepositoryError::Conflict`] when both versions are known and differ.
pub fn check_version(board_id: &str, expected: Option<i64>, stored: Option<i64>) -> Result<(), RepositoryError> {
    match (expected, stored) {
        (Some(expected), Some(actual)) if expected != actual => {
            Err(RepositoryError::Conflict { board_id: board_id.to_owned(), expected, actual })
        }
        _ => Ok(()),
    }
}

/// Version assigned to the next write of a board.
#[must_use]
pub fn next_version(stored: Option<i64>) -> i64 {
    stored.map_or(1, |v| v + 1)
}

// =============================================================================
// MEMORY REPOSITORY
// =============================================================================

/// In-process store with the same upsert and version rules as the server.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    doc: Mutex<Option<UiCustomization>>,
    history: Mutex<Vec<BoardCustomization>>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document.
    #[must_use]
    pub fn with_document(doc: UiCustomization) -> Self {
        Self { doc: Mutex::new(Some(doc)), history: Mutex::new(Vec::new()) }
    }

    /// Every board accepted by [`CustomizationRepository::save`], oldest first.
    pub async fn saved_boards(&self) -> Vec<BoardCustomization> {
        self.history.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl CustomizationRepository for MemoryRepository {
    async fn fetch_all(&self) -> Result<UiCustomization, RepositoryError> {
        let doc = self.doc.lock().await;
        Ok(doc.clone().unwrap_or_default())
    }

    async fn save(&self, board_id: &str, board: &BoardCustomization) -> Result<BoardCustomization, RepositoryError> {
        let now = OffsetDateTime::now_utc();
        let mut guard = self.doc.lock().await;
        let doc = guard.get_or_insert_with(|| UiCustomization { created_at: Some(now), ..UiCustomization::default() });

        let stored = doc.board(board_id).and_then(|b| b.version);
        check_version(board_id, board.version, stored)?;

        let mut accepted = board.clone();
        accepted.board_id = board_id.to_owned();
        accepted.version = Some(next_version(stored));
        doc.upsert_board(accepted.clone());
        doc.updated_at = Some(now);
        drop(guard);

        self.history.lock().await.push(accepted.clone());
        Ok(accepted)
    }

    async fn delete(&self, board_id: &str) -> Result<(), RepositoryError> {
        let mut guard = self.doc.lock().await;
        let doc = guard.as_mut().ok_or(RepositoryError::NotFound)?;
        doc.remove_board(board_id);
        doc.updated_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }
}
