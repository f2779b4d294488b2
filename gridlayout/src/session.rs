//! Async driver for one mounted board.
//!
//! DESIGN
//! ======
//! A `BoardSession` wraps a [`LayoutState`] behind a tokio mutex and wires it
//! to a [`CustomizationRepository`]. Everything it needs (store, mount props,
//! edit-mode flag, timings) is injected at construction; there is no global
//! state, so several boards can run side by side.
//!
//! SAVE PIPELINE
//! =============
//! - Drag/resize stops save immediately, but only while edit mode is on.
//! - Settings changes schedule a debounced save. Scheduling again restarts
//!   the timer; dropping the session aborts a pending timer. Once the timer
//!   fires the save runs in its own task and is never cancelled mid-write.
//! - Saves for one board are serialized so each write carries the version
//!   returned by the previous one.
//! - Each save bumps a generation counter. A load whose fetch was issued
//!   under an older generation is discarded as stale, and the `Saving` flag
//!   is released after the grace period only if no newer save has started.
//! - A save rejected with a version conflict refetches the board once its
//!   grace period ends. Local edits since the last load are replaced by the
//!   store's copy.
//!
//! ERROR HANDLING
//! ==============
//! Store failures never propagate as `Err`: they are logged and published as
//! [`BoardEvent::LoadFailed`] / [`BoardEvent::SaveFailed`] so the UI can
//! notify the user. There is no rollback and no retry.

use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::layout::{LayoutError, LayoutPhase, LayoutSource, LayoutState, ReconcileOutcome};
use crate::model::{DefaultCard, GridItem, UiCustomization};
use crate::popover::SettingsIntent;
use crate::repository::{CustomizationRepository, RepositoryError};

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

const EVENT_CAPACITY: usize = 64;

// =============================================================================
// TYPES
// =============================================================================

/// Props a board is mounted with.
#[derive(Debug, Clone)]
pub struct BoardMount {
    pub board_id: String,
    pub board_name: String,
    /// Layout used when the store has no cards for this board.
    pub default_layout: Vec<DefaultCard>,
    /// When false the board never writes to the store.
    pub autosave: bool,
}

impl BoardMount {
    #[must_use]
    pub fn new(board_id: &str, board_name: &str, default_layout: Vec<DefaultCard>) -> Self {
        Self {
            board_id: board_id.to_owned(),
            board_name: board_name.to_owned(),
            default_layout,
            autosave: true,
        }
    }

    #[must_use]
    pub fn without_autosave(mut self) -> Self {
        self.autosave = false;
        self
    }
}

/// Notifications published to [`BoardSession::subscribe`] receivers.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    Reconciled { source: LayoutSource, cards: usize },
    /// A load or remote document was not applied.
    LoadSkipped { outcome: ReconcileOutcome },
    LoadFailed { message: String },
    Saved { version: Option<i64> },
    /// A write failed; shown to the user as an error notification.
    SaveFailed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// No reconcile has happened yet, or the layout is empty.
    NotReady,
    /// The board was mounted without autosave.
    Disabled,
    /// Drag/resize stop outside edit mode.
    NotEditing,
    Failed,
}

/// Point-in-time view of a session for renderers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub phase: LayoutPhase,
    pub remote_version: Option<i64>,
    pub save_generation: u64,
    pub save_pending: bool,
}

// =============================================================================
// SESSION
// =============================================================================

struct Inner {
    layout: LayoutState,
    save_generation: u64,
    pending_save: Option<JoinHandle<()>>,
}

struct Shared {
    repo: Arc<dyn CustomizationRepository>,
    mount: BoardMount,
    edit_mode: watch::Receiver<bool>,
    config: SessionConfig,
    events: broadcast::Sender<BoardEvent>,
    inner: Mutex<Inner>,
    save_lock: Mutex<()>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(pending) = self.inner.get_mut().pending_save.take() {
            pending.abort();
        }
    }
}

#[derive(Clone)]
pub struct BoardSession {
    shared: Arc<Shared>,
}

impl BoardSession {
    #[must_use]
    pub fn new(
        repo: Arc<dyn CustomizationRepository>,
        mount: BoardMount,
        edit_mode: watch::Receiver<bool>,
        config: SessionConfig,
    ) -> Self {
        let layout =
            LayoutState::new(&mount.board_id, &mount.board_name).with_grid(config.grid_cols, config.grid_row_height);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                repo,
                mount,
                edit_mode,
                config,
                events,
                inner: Mutex::new(Inner { layout, save_generation: 0, pending_save: None }),
                save_lock: Mutex::new(()),
            }),
        }
    }

    #[must_use]
    pub fn board_id(&self) -> &str {
        &self.shared.mount.board_id
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.shared.events.subscribe()
    }

    /// Copy of the current layout state.
    pub async fn snapshot(&self) -> LayoutState {
        self.shared.inner.lock().await.layout.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        let inner = self.shared.inner.lock().await;
        SessionStatus {
            phase: inner.layout.phase(),
            remote_version: inner.layout.remote_version(),
            save_generation: inner.save_generation,
            save_pending: inner.pending_save.as_ref().is_some_and(|task| !task.is_finished()),
        }
    }

    // =========================================================================
    // LOAD
    // =========================================================================

    /// Fetch the customization document and reconcile this board from it.
    pub async fn load(&self) -> ReconcileOutcome {
        self.shared.load().await
    }

    /// Reconcile against a document delivered by the data layer (refetch).
    pub async fn apply_remote(&self, doc: &UiCustomization) -> ReconcileOutcome {
        let mut inner = self.shared.inner.lock().await;
        self.shared.reconcile(&mut inner, Some(doc))
    }

    // =========================================================================
    // RENDERER CALLBACKS
    // =========================================================================

    pub async fn apply_drag_or_resize(&self, new_layout: Vec<GridItem>) {
        self.shared.inner.lock().await.layout.apply_drag_or_resize(new_layout);
    }

    pub async fn apply_ratio_constrained_resize(&self, old: &GridItem, new: GridItem) -> GridItem {
        self.shared.inner.lock().await.layout.apply_ratio_constrained_resize(old, new)
    }

    pub async fn on_drag_stop(&self) -> SaveOutcome {
        self.save_if_editing("drag").await
    }

    pub async fn on_resize_stop(&self) -> SaveOutcome {
        self.save_if_editing("resize").await
    }

    async fn save_if_editing(&self, gesture: &str) -> SaveOutcome {
        if !*self.shared.edit_mode.borrow() {
            debug!(board_id = %self.board_id(), gesture, "save skipped outside edit mode");
            return SaveOutcome::NotEditing;
        }
        self.shared.save().await
    }

    // =========================================================================
    // SETTINGS
    // =========================================================================

    /// Resize a card from the settings popover and schedule a save.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownCard`] if the card is not on this board.
    pub async fn set_manual_size(&self, card_id: &str, w: u32, h: u32) -> Result<GridItem, LayoutError> {
        let mut inner = self.shared.inner.lock().await;
        let item = inner.layout.set_manual_size(card_id, w, h)?;
        self.schedule_save(&mut inner);
        Ok(item)
    }

    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownCard`] if the card is not on this board.
    pub async fn toggle_ratio_lock(&self, card_id: &str, lock: bool, ratio: Option<f64>) -> Result<(), LayoutError> {
        let mut inner = self.shared.inner.lock().await;
        inner.layout.toggle_ratio_lock(card_id, lock, ratio)?;
        self.schedule_save(&mut inner);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownCard`] if the card is not on this board.
    pub async fn toggle_lock_in_place(&self, card_id: &str, lock: bool) -> Result<(), LayoutError> {
        let mut inner = self.shared.inner.lock().await;
        inner.layout.toggle_lock_in_place(card_id, lock)?;
        self.schedule_save(&mut inner);
        Ok(())
    }

    /// Apply an intent produced by [`crate::popover::CardSettingsDraft`].
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownCard`] if the card is not on this board.
    pub async fn apply_settings_intent(&self, card_id: &str, intent: SettingsIntent) -> Result<(), LayoutError> {
        match intent {
            SettingsIntent::Resize { w, h } => self.set_manual_size(card_id, w, h).await.map(|_| ()),
            SettingsIntent::RatioLock { locked, ratio } => self.toggle_ratio_lock(card_id, locked, Some(ratio)).await,
            SettingsIntent::LockInPlace { locked } => self.toggle_lock_in_place(card_id, locked).await,
        }
    }

    /// Save now, bypassing the debounce and edit-mode checks.
    pub async fn save(&self) -> SaveOutcome {
        self.shared.save().await
    }

    fn schedule_save(&self, inner: &mut Inner) {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let delay = self.shared.config.save_debounce;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                shared.save().await;
            });
        });

        if let Some(previous) = inner.pending_save.replace(timer) {
            previous.abort();
            debug!(board_id = %self.board_id(), "debounced save restarted");
        }
    }
}

impl Shared {
    fn publish(&self, event: BoardEvent) {
        if self.events.send(event).is_err() {
            debug!(board_id = %self.mount.board_id, "no board event subscribers");
        }
    }

    fn reconcile(&self, inner: &mut Inner, doc: Option<&UiCustomization>) -> ReconcileOutcome {
        let outcome = inner.layout.reconcile(doc, &self.mount.default_layout);
        match outcome {
            ReconcileOutcome::Applied(source) => {
                self.publish(BoardEvent::Reconciled { source, cards: inner.layout.layout().len() });
            }
            other => self.publish(BoardEvent::LoadSkipped { outcome: other }),
        }
        outcome
    }

    async fn load(&self) -> ReconcileOutcome {
        let issued_under = {
            let mut inner = self.inner.lock().await;
            inner.layout.begin_load();
            inner.save_generation
        };

        let fetched = self.repo.fetch_all().await;

        let mut inner = self.inner.lock().await;
        if inner.save_generation != issued_under {
            warn!(board_id = %self.mount.board_id, "discarding load issued before a newer save");
            self.publish(BoardEvent::LoadSkipped { outcome: ReconcileOutcome::Stale });
            return ReconcileOutcome::Stale;
        }

        match fetched {
            Ok(doc) => self.reconcile(&mut inner, Some(&doc)),
            Err(err) => {
                warn!(board_id = %self.mount.board_id, error = %err, "customization fetch failed");
                self.publish(BoardEvent::LoadFailed { message: err.to_string() });
                if inner.layout.is_initialized() {
                    return ReconcileOutcome::KeptCurrent;
                }
                self.reconcile(&mut inner, None)
            }
        }
    }

    async fn save(self: &Arc<Self>) -> SaveOutcome {
        if !self.mount.autosave {
            debug!(board_id = %self.mount.board_id, "autosave disabled");
            return SaveOutcome::Disabled;
        }

        let _serialized = self.save_lock.lock().await;
        let (board, generation) = {
            let mut inner = self.inner.lock().await;
            let Some(board) = inner.layout.build_customization() else {
                debug!(board_id = %self.mount.board_id, "nothing to save yet");
                return SaveOutcome::NotReady;
            };
            inner.save_generation += 1;
            inner.layout.mark_saving();
            (board, inner.save_generation)
        };

        let mut reload = false;
        let outcome = match self.repo.save(&self.mount.board_id, &board).await {
            Ok(stored) => {
                self.inner.lock().await.layout.record_saved_version(stored.version);
                info!(board_id = %self.mount.board_id, cards = board.cards.len(), version = ?stored.version, "board saved");
                self.publish(BoardEvent::Saved { version: stored.version });
                SaveOutcome::Saved
            }
            Err(err) => {
                reload = matches!(err, RepositoryError::Conflict { .. });
                error!(board_id = %self.mount.board_id, error = %err, "board save failed");
                self.publish(BoardEvent::SaveFailed { message: err.to_string() });
                SaveOutcome::Failed
            }
        };

        self.release_after_grace(generation, reload);
        outcome
    }

    /// Leave `Saving` once the grace period passes, unless a newer save began.
    /// With `reload` set the board is then refetched, so a write rejected as
    /// stale picks up the store's copy and its current version.
    fn release_after_grace(self: &Arc<Self>, generation: u64, reload: bool) {
        let weak = Arc::downgrade(self);
        let grace = self.config.save_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            {
                let mut inner = shared.inner.lock().await;
                if inner.save_generation != generation {
                    return;
                }
                inner.layout.finish_saving();
                debug!(board_id = %shared.mount.board_id, "save grace period elapsed");
            }
            if reload {
                info!(board_id = %shared.mount.board_id, "reloading board after version conflict");
                shared.load().await;
            }
        });
    }
}
