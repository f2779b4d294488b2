//! In-memory layout of one board.
//!
//! DESIGN
//! ======
//! `LayoutState` is the synchronous core behind [`crate::session::BoardSession`]:
//! it owns the grid items, ratio locks, lock-in-place set, and card types, and
//! knows how to rebuild itself from a remote document or a default layout and
//! how to flatten itself back into a [`BoardCustomization`]. It never performs
//! I/O, so every rule here is testable without a runtime.
//!
//! LIFECYCLE
//! =========
//! `Uninitialized -> Loading -> Idle <-> Saving`. While `Saving`, reconcile
//! requests are skipped so a refetch triggered by our own write cannot
//! overwrite local edits with an older server copy.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::model::{
    BoardCustomization, CardPlacement, DEFAULT_CARD_TYPE, DEFAULT_GRID_COLS, DEFAULT_GRID_ROW_HEIGHT, DefaultCard,
    GridItem, UiCustomization, effective_min,
};

#[cfg(test)]
#[path = "layout_test.rs"]
mod tests;

/// Size shown for a rendered card that has no layout entry yet.
const FALLBACK_CARD_W: u32 = 3;
const FALLBACK_CARD_H: u32 = 2;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("card not on board: {0}")]
    UnknownCard(String),
}

/// Lifecycle of a board's layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayoutPhase {
    #[default]
    Uninitialized,
    Loading,
    Idle,
    Saving,
}

/// Where a reconciled layout came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutSource {
    Remote,
    Default,
}

/// Result of a reconcile attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied(LayoutSource),
    /// A save is in flight or inside its grace period.
    SkippedWhileSaving,
    /// The fetch was issued before a later save started.
    Stale,
    /// A refetch failed after the board was already initialized.
    KeptCurrent,
}

/// Popover props for one rendered card, in render order.
#[derive(Debug, Clone, PartialEq)]
pub struct CardSlot {
    pub card_id: String,
    pub w: u32,
    pub h: u32,
    pub ratio_locked: bool,
    pub ratio: Option<f64>,
    pub locked_in_place: bool,
}

// =============================================================================
// LAYOUT STATE
// =============================================================================

#[derive(Debug, Clone)]
pub struct LayoutState {
    board_id: String,
    board_name: String,
    grid_cols: u32,
    grid_row_height: u32,
    layout: Vec<GridItem>,
    ratio_locks: HashMap<String, f64>,
    locked_cards: HashSet<String>,
    card_types: HashMap<String, String>,
    phase: LayoutPhase,
    remote_version: Option<i64>,
}

impl LayoutState {
    #[must_use]
    pub fn new(board_id: &str, board_name: &str) -> Self {
        Self {
            board_id: board_id.to_owned(),
            board_name: board_name.to_owned(),
            grid_cols: DEFAULT_GRID_COLS,
            grid_row_height: DEFAULT_GRID_ROW_HEIGHT,
            layout: Vec::new(),
            ratio_locks: HashMap::new(),
            locked_cards: HashSet::new(),
            card_types: HashMap::new(),
            phase: LayoutPhase::Uninitialized,
            remote_version: None,
        }
    }

    /// Override the grid geometry written on save.
    #[must_use]
    pub fn with_grid(mut self, grid_cols: u32, grid_row_height: u32) -> Self {
        self.grid_cols = grid_cols;
        self.grid_row_height = grid_row_height;
        self
    }

    #[must_use]
    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    #[must_use]
    pub fn layout(&self) -> &[GridItem] {
        &self.layout
    }

    #[must_use]
    pub fn item(&self, card_id: &str) -> Option<&GridItem> {
        self.layout.iter().find(|item| item.card_id == card_id)
    }

    #[must_use]
    pub fn ratio_lock(&self, card_id: &str) -> Option<f64> {
        self.ratio_locks.get(card_id).copied()
    }

    #[must_use]
    pub fn locked_cards(&self) -> &HashSet<String> {
        &self.locked_cards
    }

    #[must_use]
    pub fn card_type(&self, card_id: &str) -> Option<&str> {
        self.card_types.get(card_id).map(String::as_str)
    }

    #[must_use]
    pub fn card_types(&self) -> &HashMap<String, String> {
        &self.card_types
    }

    #[must_use]
    pub fn phase(&self) -> LayoutPhase {
        self.phase
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(self.phase, LayoutPhase::Idle | LayoutPhase::Saving)
    }

    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.phase == LayoutPhase::Saving
    }

    #[must_use]
    pub fn remote_version(&self) -> Option<i64> {
        self.remote_version
    }

    // =========================================================================
    // RECONCILE
    // =========================================================================

    /// Mark a fetch as in flight. Only moves out of `Uninitialized`.
    pub fn begin_load(&mut self) {
        if self.phase == LayoutPhase::Uninitialized {
            self.phase = LayoutPhase::Loading;
        }
    }

    /// Rebuild the layout from the remote document, falling back to `defaults`
    /// when the board has no saved cards.
    pub fn reconcile(&mut self, remote: Option<&UiCustomization>, defaults: &[DefaultCard]) -> ReconcileOutcome {
        if self.is_saving() {
            debug!(board_id = %self.board_id, "reconcile skipped while saving");
            return ReconcileOutcome::SkippedWhileSaving;
        }

        let saved = remote
            .and_then(|doc| doc.board(&self.board_id))
            .filter(|board| !board.cards.is_empty());

        let source = match saved {
            Some(board) => {
                self.adopt_saved(board);
                LayoutSource::Remote
            }
            None => {
                self.adopt_defaults(defaults);
                LayoutSource::Default
            }
        };

        self.phase = LayoutPhase::Idle;
        info!(board_id = %self.board_id, ?source, cards = self.layout.len(), "layout reconciled");
        ReconcileOutcome::Applied(source)
    }

    fn adopt_saved(&mut self, board: &BoardCustomization) {
        self.layout = board.cards.iter().map(grid_item_from_placement).collect();
        self.ratio_locks = board
            .cards
            .iter()
            .filter(|card| card.aspect_ratio_locked)
            .filter_map(|card| restored_ratio(card).map(|ratio| (card.card_id.clone(), ratio)))
            .collect();
        self.locked_cards = board
            .cards
            .iter()
            .filter(|card| card.locked)
            .map(|card| card.card_id.clone())
            .collect();
        self.card_types = board
            .cards
            .iter()
            .filter(|card| !card.card_type.is_empty())
            .map(|card| (card.card_id.clone(), card.card_type.clone()))
            .collect();
        self.remote_version = board.version;
    }

    fn adopt_defaults(&mut self, defaults: &[DefaultCard]) {
        self.layout = defaults.iter().map(DefaultCard::to_grid_item).collect();
        self.card_types = defaults
            .iter()
            .filter_map(|card| card.card_type.as_ref().map(|t| (card.i.clone(), t.clone())))
            .collect();
        self.ratio_locks.clear();
        self.locked_cards.clear();
        self.remote_version = None;
    }

    // =========================================================================
    // RENDERER CALLBACKS
    // =========================================================================

    /// Replace the layout with the renderer's post-drag/resize array.
    pub fn apply_drag_or_resize(&mut self, new_layout: Vec<GridItem>) {
        self.layout = new_layout;
    }

    /// Adjust `new` in place so a ratio-locked card keeps its proportion.
    /// Returns whether an adjustment was made.
    pub fn constrain_resize(&self, old: &GridItem, new: &mut GridItem) -> bool {
        let Some(ratio) = self.ratio_lock(&new.card_id) else {
            return false;
        };

        if new.w != old.w {
            new.h = new.clamp_h(round_dimension(f64::from(new.w) / ratio));
        } else {
            new.w = new.clamp_w(round_dimension(f64::from(new.h) * ratio));
        }
        true
    }

    /// Ratio-constrain a single resized item and store it in the layout.
    pub fn apply_ratio_constrained_resize(&mut self, old: &GridItem, mut new: GridItem) -> GridItem {
        self.constrain_resize(old, &mut new);
        match self.layout.iter_mut().find(|item| item.card_id == new.card_id) {
            Some(slot) => *slot = new.clone(),
            None => self.layout.push(new.clone()),
        }
        new
    }

    // =========================================================================
    // SETTINGS INTENTS
    // =========================================================================

    /// Set a card's size directly, clamped into its min/max bounds.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownCard`] if the card is not on this board.
    pub fn set_manual_size(&mut self, card_id: &str, w: u32, h: u32) -> Result<GridItem, LayoutError> {
        let item = self.item_mut(card_id)?;
        item.w = item.clamp_w(w);
        item.h = item.clamp_h(h);
        Ok(item.clone())
    }

    /// Set or clear a card's ratio lock. A missing or unusable ratio falls back
    /// to the card's current `w/h`.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownCard`] if the card is not on this board.
    pub fn toggle_ratio_lock(&mut self, card_id: &str, lock: bool, ratio: Option<f64>) -> Result<(), LayoutError> {
        let current = self.item_mut(card_id)?.ratio();
        if !lock {
            self.ratio_locks.remove(card_id);
            return Ok(());
        }

        match ratio.filter(|r| is_usable_ratio(*r)).or(current) {
            Some(ratio) => {
                self.ratio_locks.insert(card_id.to_owned(), ratio);
            }
            None => debug!(card_id, "ratio lock ignored for zero-height card"),
        }
        Ok(())
    }

    /// Lock or unlock a card in place, mirroring the flag into the grid item.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownCard`] if the card is not on this board.
    pub fn toggle_lock_in_place(&mut self, card_id: &str, lock: bool) -> Result<(), LayoutError> {
        self.item_mut(card_id)?.locked = lock;
        if lock {
            self.locked_cards.insert(card_id.to_owned());
        } else {
            self.locked_cards.remove(card_id);
        }
        Ok(())
    }

    fn item_mut(&mut self, card_id: &str) -> Result<&mut GridItem, LayoutError> {
        self.layout
            .iter_mut()
            .find(|item| item.card_id == card_id)
            .ok_or_else(|| LayoutError::UnknownCard(card_id.to_owned()))
    }

    // =========================================================================
    // SAVE
    // =========================================================================

    /// Full board document for the store, or `None` before the first reconcile
    /// or when there is nothing to save.
    #[must_use]
    pub fn build_customization(&self) -> Option<BoardCustomization> {
        if !self.is_initialized() || self.layout.is_empty() {
            return None;
        }

        let cards = self
            .layout
            .iter()
            .map(|item| {
                let ratio = self.ratio_locks.get(&item.card_id).copied();
                CardPlacement {
                    card_id: item.card_id.clone(),
                    card_type: self
                        .card_types
                        .get(&item.card_id)
                        .cloned()
                        .unwrap_or_else(|| DEFAULT_CARD_TYPE.to_owned()),
                    x: item.x,
                    y: item.y,
                    w: item.w,
                    h: item.h,
                    locked: self.locked_cards.contains(&item.card_id),
                    aspect_ratio_locked: ratio.is_some(),
                    aspect_ratio: ratio,
                    min_w: effective_min(item.min_w),
                    min_h: effective_min(item.min_h),
                    max_w: item.max_w,
                    max_h: item.max_h,
                }
            })
            .collect();

        Some(BoardCustomization {
            board_id: self.board_id.clone(),
            board_name: self.board_name.clone(),
            grid_cols: self.grid_cols,
            grid_row_height: self.grid_row_height,
            cards,
            version: self.remote_version,
        })
    }

    pub fn mark_saving(&mut self) {
        self.phase = LayoutPhase::Saving;
    }

    /// Leave `Saving` once the grace period has elapsed.
    pub fn finish_saving(&mut self) {
        if self.phase == LayoutPhase::Saving {
            self.phase = LayoutPhase::Idle;
        }
    }

    /// Record the revision the store assigned to our last write.
    pub fn record_saved_version(&mut self, version: Option<i64>) {
        if version.is_some() {
            self.remote_version = version;
        }
    }

    // =========================================================================
    // RENDER CONTRACT
    // =========================================================================

    /// Settings props for `count` rendered cards in render order. Children past
    /// the end of the layout get a synthetic `card-{index}` id and a 3x2 size.
    #[must_use]
    pub fn card_slots(&self, count: usize) -> Vec<CardSlot> {
        (0..count)
            .map(|index| {
                let card_id = self
                    .layout
                    .get(index)
                    .map_or_else(|| format!("card-{index}"), |item| item.card_id.clone());
                let (w, h) = self
                    .item(&card_id)
                    .map_or((FALLBACK_CARD_W, FALLBACK_CARD_H), |item| (item.w, item.h));
                let ratio = self.ratio_lock(&card_id);
                CardSlot {
                    ratio_locked: ratio.is_some(),
                    ratio,
                    locked_in_place: self.locked_cards.contains(&card_id),
                    card_id,
                    w,
                    h,
                }
            })
            .collect()
    }
}

fn grid_item_from_placement(card: &CardPlacement) -> GridItem {
    GridItem {
        card_id: card.card_id.clone(),
        x: card.x,
        y: card.y,
        w: card.w,
        h: card.h,
        min_w: effective_min(card.min_w),
        min_h: effective_min(card.min_h),
        max_w: card.max_w,
        max_h: card.max_h,
        locked: card.locked,
    }
}

/// Stored ratio when present and usable, else the card's current `w/h`.
fn restored_ratio(card: &CardPlacement) -> Option<f64> {
    if let Some(ratio) = card.aspect_ratio.filter(|r| is_usable_ratio(*r)) {
        return Some(ratio);
    }
    if card.h == 0 {
        return None;
    }
    Some(f64::from(card.w) / f64::from(card.h))
}

fn is_usable_ratio(ratio: f64) -> bool {
    ratio.is_finite() && ratio > 0.0
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_dimension(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    value.round().min(f64::from(u32::MAX)) as u32
}
