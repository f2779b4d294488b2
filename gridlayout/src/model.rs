//! Persisted board documents and the render-ready grid item.
//!
//! DESIGN
//! ======
//! Two shapes of the same card exist. [`CardPlacement`] is what the
//! customization store keeps (camelCase JSON, one record per card, locks as
//! booleans). [`GridItem`] is what the grid renderer consumes (`i` for the id,
//! `static` for lock-in-place). [`crate::layout::LayoutState`] converts between
//! them on reconcile and save.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;

pub const DEFAULT_GRID_COLS: u32 = 12;
pub const DEFAULT_GRID_ROW_HEIGHT: u32 = 100;
pub const DEFAULT_MIN_SIZE: u32 = 2;
pub const DEFAULT_CARD_TYPE: &str = "generic";
pub const DEFAULT_USER_ID: &str = "default";

fn default_card_type() -> String {
    DEFAULT_CARD_TYPE.to_owned()
}

fn default_min_size() -> u32 {
    DEFAULT_MIN_SIZE
}

fn default_grid_cols() -> u32 {
    DEFAULT_GRID_COLS
}

fn default_grid_row_height() -> u32 {
    DEFAULT_GRID_ROW_HEIGHT
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_owned()
}

/// Stored minimum sizes of 0 come from older documents; treat them as unset.
#[must_use]
pub fn effective_min(value: u32) -> u32 {
    if value == 0 { DEFAULT_MIN_SIZE } else { value }
}

// =============================================================================
// PERSISTED DOCUMENTS
// =============================================================================

/// One card on a board as kept by the customization store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPlacement {
    pub card_id: String,
    #[serde(default = "default_card_type")]
    pub card_type: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub aspect_ratio_locked: bool,
    /// Ratio captured when the lock was taken. Older documents omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,
    #[serde(default = "default_min_size")]
    pub min_w: u32,
    #[serde(default = "default_min_size")]
    pub min_h: u32,
    #[serde(default)]
    pub max_w: Option<u32>,
    #[serde(default)]
    pub max_h: Option<u32>,
}

/// Saved layout of one board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardCustomization {
    pub board_id: String,
    pub board_name: String,
    #[serde(default = "default_grid_cols")]
    pub grid_cols: u32,
    #[serde(default = "default_grid_row_height")]
    pub grid_row_height: u32,
    #[serde(default)]
    pub cards: Vec<CardPlacement>,
    /// Store-assigned revision. A save carrying a stale value is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl BoardCustomization {
    /// Look up a card by id.
    #[must_use]
    pub fn card(&self, card_id: &str) -> Option<&CardPlacement> {
        self.cards.iter().find(|card| card.card_id == card_id)
    }
}

/// The whole customization document for the store's single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiCustomization {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub boards: Vec<BoardCustomization>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Default for UiCustomization {
    fn default() -> Self {
        Self { user_id: default_user_id(), boards: Vec::new(), created_at: None, updated_at: None }
    }
}

impl UiCustomization {
    /// Find a board by its identifier.
    #[must_use]
    pub fn board(&self, board_id: &str) -> Option<&BoardCustomization> {
        self.boards.iter().find(|board| board.board_id == board_id)
    }

    /// Replace the board with the same id, or append it. Returns the previous entry.
    pub fn upsert_board(&mut self, board: BoardCustomization) -> Option<BoardCustomization> {
        match self.boards.iter_mut().find(|b| b.board_id == board.board_id) {
            Some(existing) => Some(std::mem::replace(existing, board)),
            None => {
                self.boards.push(board);
                None
            }
        }
    }

    /// Remove a board by id. Returns the removed entry.
    pub fn remove_board(&mut self, board_id: &str) -> Option<BoardCustomization> {
        let index = self.boards.iter().position(|b| b.board_id == board_id)?;
        Some(self.boards.remove(index))
    }
}

// =============================================================================
// RENDER FORM
// =============================================================================

/// Grid cell handed to (and reported back by) the grid renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridItem {
    #[serde(rename = "i")]
    pub card_id: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub min_w: u32,
    pub min_h: u32,
    #[serde(default)]
    pub max_w: Option<u32>,
    #[serde(default)]
    pub max_h: Option<u32>,
    /// Locked in place: the renderer must not drag, resize, or compact it.
    #[serde(rename = "static", default)]
    pub locked: bool,
}

impl GridItem {
    /// Clamp a width into this item's `[min_w, max_w]` range.
    #[must_use]
    pub fn clamp_w(&self, w: u32) -> u32 {
        clamp_dimension(w, self.min_w, self.max_w)
    }

    /// Clamp a height into this item's `[min_h, max_h]` range.
    #[must_use]
    pub fn clamp_h(&self, h: u32) -> u32 {
        clamp_dimension(h, self.min_h, self.max_h)
    }

    /// Current width/height ratio, or `None` for a degenerate zero-height item.
    #[must_use]
    pub fn ratio(&self) -> Option<f64> {
        if self.h == 0 {
            return None;
        }
        Some(f64::from(self.w) / f64::from(self.h))
    }
}

fn clamp_dimension(value: u32, min: u32, max: Option<u32>) -> u32 {
    let value = value.max(min);
    match max {
        // A max below the min is a caller bug; the min wins.
        Some(max) if max >= min => value.min(max),
        _ => value,
    }
}

/// Entry of a board's caller-supplied default layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultCard {
    pub i: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    #[serde(default = "default_min_size")]
    pub min_w: u32,
    #[serde(default = "default_min_size")]
    pub min_h: u32,
    #[serde(default)]
    pub max_w: Option<u32>,
    #[serde(default)]
    pub max_h: Option<u32>,
    #[serde(default)]
    pub card_type: Option<String>,
}

impl DefaultCard {
    /// Shorthand used by boards declaring their defaults in code.
    #[must_use]
    pub fn new(i: &str, x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            i: i.to_owned(),
            x,
            y,
            w,
            h,
            min_w: DEFAULT_MIN_SIZE,
            min_h: DEFAULT_MIN_SIZE,
            max_w: None,
            max_h: None,
            card_type: None,
        }
    }

    #[must_use]
    pub fn with_type(mut self, card_type: &str) -> Self {
        self.card_type = Some(card_type.to_owned());
        self
    }

    #[must_use]
    pub fn with_min(mut self, min_w: u32, min_h: u32) -> Self {
        self.min_w = min_w;
        self.min_h = min_h;
        self
    }

    /// Render form, copied verbatim (defaults are adopted as given).
    #[must_use]
    pub fn to_grid_item(&self) -> GridItem {
        GridItem {
            card_id: self.i.clone(),
            x: self.x,
            y: self.y,
            w: self.w,
            h: self.h,
            min_w: self.min_w,
            min_h: self.min_h,
            max_w: self.max_w,
            max_h: self.max_h,
            locked: false,
        }
    }
}
