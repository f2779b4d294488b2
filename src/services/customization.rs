//! Customization service: document and per-board persistence.
//!
//! DESIGN
//! ======
//! One `ui_customizations` row per user carries the document timestamps and
//! each board lives in its own `board_customizations` row, so saving one board
//! never rewrites another. Board writes bump a `version` counter; a write that
//! names a version must match the stored one or it is rejected as a conflict.
//!
//! ERROR HANDLING
//! ==============
//! Validation runs before any SQL. Every multi-statement write runs in one
//! transaction, so a failed write leaves the previous document untouched.

use std::collections::{HashMap, HashSet};

use gridlayout::model::{BoardCustomization, DEFAULT_GRID_COLS, DEFAULT_GRID_ROW_HEIGHT, UiCustomization};
use gridlayout::repository::{RepositoryError, check_version, next_version};
use sqlx::{PgExecutor, PgPool};
use time::OffsetDateTime;
use tracing::info;

#[cfg(test)]
#[path = "customization_test.rs"]
mod tests;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CustomizationError {
    #[error("Customization not found")]
    NotFound,
    #[error("board {board_id} was modified elsewhere (expected version {expected}, found {actual})")]
    Conflict { board_id: String, expected: i64, actual: i64 },
    #[error("{0}")]
    Invalid(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("card encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// How a whole-document write treats a missing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    /// `POST`: create the document if needed.
    CreateOrReplace,
    /// `PUT`: fail with [`CustomizationError::NotFound`] if there is none.
    ExistingOnly,
}

type BoardRow = (String, String, i64, i64, serde_json::Value, i64);

// =============================================================================
// VALIDATION
// =============================================================================

/// Reject boards the layout engine could not render.
///
/// # Errors
///
/// Returns [`CustomizationError::Invalid`] naming the first problem found.
pub fn validate_board(board: &BoardCustomization) -> Result<(), CustomizationError> {
    if board.board_id.trim().is_empty() {
        return Err(CustomizationError::Invalid("boardId must not be empty".into()));
    }
    if board.grid_cols == 0 || board.grid_row_height == 0 {
        return Err(CustomizationError::Invalid(format!(
            "board {}: gridCols and gridRowHeight must be at least 1",
            board.board_id
        )));
    }

    let mut seen = HashSet::new();
    for card in &board.cards {
        if card.card_id.trim().is_empty() {
            return Err(CustomizationError::Invalid(format!("board {}: cardId must not be empty", board.board_id)));
        }
        if !seen.insert(card.card_id.as_str()) {
            return Err(CustomizationError::Invalid(format!("board {}: duplicate cardId {}", board.board_id, card.card_id)));
        }
        if card.w == 0 || card.h == 0 {
            return Err(CustomizationError::Invalid(format!("card {}: w and h must be at least 1", card.card_id)));
        }
        if card.max_w.is_some_and(|max| card.min_w > max) || card.max_h.is_some_and(|max| card.min_h > max) {
            return Err(CustomizationError::Invalid(format!("card {}: minimum size exceeds maximum", card.card_id)));
        }
    }
    Ok(())
}

fn validate_board_list(boards: &[BoardCustomization]) -> Result<(), CustomizationError> {
    let mut seen = HashSet::new();
    for board in boards {
        validate_board(board)?;
        if !seen.insert(board.board_id.as_str()) {
            return Err(CustomizationError::Invalid(format!("duplicate boardId {}", board.board_id)));
        }
    }
    Ok(())
}

fn conflict_from(err: RepositoryError) -> CustomizationError {
    match err {
        RepositoryError::Conflict { board_id, expected, actual } => CustomizationError::Conflict { board_id, expected, actual },
        other => CustomizationError::Invalid(other.to_string()),
    }
}

// =============================================================================
// READ
// =============================================================================

/// Full document for `user_id`. A user with nothing stored gets an empty
/// document stamped with the current time.
///
/// # Errors
///
/// Returns a database error if a query fails or stored cards no longer decode.
pub async fn get_customization(pool: &PgPool, user_id: &str) -> Result<UiCustomization, CustomizationError> {
    let header = sqlx::query_as::<_, (OffsetDateTime, OffsetDateTime)>(
        "SELECT created_at, updated_at FROM ui_customizations WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some((created_at, updated_at)) = header else {
        let now = OffsetDateTime::now_utc();
        return Ok(UiCustomization {
            user_id: user_id.to_owned(),
            boards: Vec::new(),
            created_at: Some(now),
            updated_at: Some(now),
        });
    };

    Ok(UiCustomization {
        user_id: user_id.to_owned(),
        boards: load_boards(pool, user_id).await?,
        created_at: Some(created_at),
        updated_at: Some(updated_at),
    })
}

async fn load_boards(executor: impl PgExecutor<'_>, user_id: &str) -> Result<Vec<BoardCustomization>, CustomizationError> {
    let rows = sqlx::query_as::<_, BoardRow>(
        "SELECT board_id, board_name, grid_cols, grid_row_height, cards, version
         FROM board_customizations
         WHERE user_id = $1
         ORDER BY position, board_id",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(board_from_row).collect()
}

fn board_from_row(row: BoardRow) -> Result<BoardCustomization, CustomizationError> {
    let (board_id, board_name, grid_cols, grid_row_height, cards, version) = row;
    Ok(BoardCustomization {
        board_id,
        board_name,
        grid_cols: u32::try_from(grid_cols).unwrap_or(DEFAULT_GRID_COLS),
        grid_row_height: u32::try_from(grid_row_height).unwrap_or(DEFAULT_GRID_ROW_HEIGHT),
        cards: serde_json::from_value(cards)?,
        version: Some(version),
    })
}

// =============================================================================
// WRITE
// =============================================================================

/// Replace the whole board list. Every written board gets the next version
/// after whatever was stored under its id.
///
/// # Errors
///
/// Returns [`CustomizationError::Invalid`] for a bad board,
/// [`CustomizationError::NotFound`] in [`ReplaceMode::ExistingOnly`] when no
/// document exists, or a database error.
pub async fn replace_customization(
    pool: &PgPool,
    user_id: &str,
    boards: &[BoardCustomization],
    mode: ReplaceMode,
) -> Result<UiCustomization, CustomizationError> {
    validate_board_list(boards)?;

    let mut tx = pool.begin().await?;
    match mode {
        ReplaceMode::CreateOrReplace => touch_document(&mut *tx, user_id).await?,
        ReplaceMode::ExistingOnly => {
            let updated = sqlx::query("UPDATE ui_customizations SET updated_at = now() WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            if updated.rows_affected() == 0 {
                return Err(CustomizationError::NotFound);
            }
        }
    }

    let stored: HashMap<String, i64> =
        sqlx::query_as::<_, (String, i64)>("SELECT board_id, version FROM board_customizations WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect();

    sqlx::query("DELETE FROM board_customizations WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    for (position, board) in boards.iter().enumerate() {
        let version = next_version(stored.get(&board.board_id).copied());
        sqlx::query(
            "INSERT INTO board_customizations
                 (user_id, board_id, position, board_name, grid_cols, grid_row_height, cards, version)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(user_id)
        .bind(&board.board_id)
        .bind(i64::try_from(position).unwrap_or(i64::MAX))
        .bind(&board.board_name)
        .bind(i64::from(board.grid_cols))
        .bind(i64::from(board.grid_row_height))
        .bind(serde_json::to_value(&board.cards)?)
        .bind(version)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(user_id, boards = boards.len(), ?mode, "customization replaced");

    get_customization(pool, user_id).await
}

/// Insert or replace one board, creating the document if needed. The path id
/// wins over the body id. Returns the stored board with its new version.
///
/// # Errors
///
/// Returns [`CustomizationError::Invalid`] for a bad board,
/// [`CustomizationError::Conflict`] when the body's version is stale, or a
/// database error.
pub async fn upsert_board(
    pool: &PgPool,
    user_id: &str,
    board_id: &str,
    mut board: BoardCustomization,
) -> Result<BoardCustomization, CustomizationError> {
    board.board_id = board_id.to_owned();
    validate_board(&board)?;

    let mut tx = pool.begin().await?;
    touch_document(&mut *tx, user_id).await?;

    let stored = sqlx::query_as::<_, (i64,)>(
        "SELECT version FROM board_customizations WHERE user_id = $1 AND board_id = $2 FOR UPDATE",
    )
    .bind(user_id)
    .bind(board_id)
    .fetch_optional(&mut *tx)
    .await?
    .map(|(version,)| version);

    check_version(board_id, board.version, stored).map_err(conflict_from)?;
    let version = next_version(stored);

    sqlx::query(
        "INSERT INTO board_customizations
             (user_id, board_id, position, board_name, grid_cols, grid_row_height, cards, version)
         VALUES (
             $1, $2,
             (SELECT COALESCE(MAX(position) + 1, 0) FROM board_customizations WHERE user_id = $1),
             $3, $4, $5, $6, $7
         )
         ON CONFLICT (user_id, board_id) DO UPDATE SET
             board_name = EXCLUDED.board_name,
             grid_cols = EXCLUDED.grid_cols,
             grid_row_height = EXCLUDED.grid_row_height,
             cards = EXCLUDED.cards,
             version = EXCLUDED.version,
             updated_at = now()",
    )
    .bind(user_id)
    .bind(board_id)
    .bind(&board.board_name)
    .bind(i64::from(board.grid_cols))
    .bind(i64::from(board.grid_row_height))
    .bind(serde_json::to_value(&board.cards)?)
    .bind(version)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(user_id, board_id, cards = board.cards.len(), version, "board customization saved");

    board.version = Some(version);
    Ok(board)
}

/// Remove one board from the document.
///
/// # Errors
///
/// Returns [`CustomizationError::NotFound`] if the user has no document, or a
/// database error.
pub async fn delete_board(pool: &PgPool, user_id: &str, board_id: &str) -> Result<(), CustomizationError> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query("UPDATE ui_customizations SET updated_at = now() WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(CustomizationError::NotFound);
    }

    let removed = sqlx::query("DELETE FROM board_customizations WHERE user_id = $1 AND board_id = $2")
        .bind(user_id)
        .bind(board_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(user_id, board_id, removed = removed.rows_affected(), "board customization deleted");
    Ok(())
}

async fn touch_document(executor: impl PgExecutor<'_>, user_id: &str) -> Result<(), CustomizationError> {
    sqlx::query(
        "INSERT INTO ui_customizations (user_id) VALUES ($1)
         ON CONFLICT (user_id) DO UPDATE SET updated_at = now()",
    )
    .bind(user_id)
    .execute(executor)
    .await?;
    Ok(())
}
