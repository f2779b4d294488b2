//! Editable dashboard grid: layout state, persistence, and time breakdowns.
//!
//! This crate owns everything a board needs between the grid renderer and the
//! remote customization store: the persisted card model, the in-memory layout
//! with its ratio and position locks, the async session that loads and saves a
//! board without feedback loops, the card settings draft, and the pure
//! session-time aggregation used by the stats cards.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`model`] | Persisted card/board documents and the render-ready grid item |
//! | [`layout`] | Pure, synchronous [`layout::LayoutState`] for one board |
//! | [`session`] | Async [`session::BoardSession`]: load, reconcile, debounced save |
//! | [`popover`] | Card settings draft that turns numeric entry into intents |
//! | [`repository`] | Customization store trait plus the in-memory store |
//! | [`http`] | reqwest-backed store talking to the studyboard server |
//! | [`breakdown`] | Per-course/per-project time totals for a period |
//! | [`config`] | Environment-driven session and HTTP settings |

pub mod breakdown;
pub mod config;
pub mod http;
pub mod layout;
pub mod model;
pub mod popover;
pub mod repository;
pub mod session;

pub use layout::{LayoutError, LayoutPhase, LayoutState, ReconcileOutcome};
pub use model::{BoardCustomization, CardPlacement, DefaultCard, GridItem, UiCustomization};
pub use repository::{CustomizationRepository, MemoryRepository, RepositoryError};
pub use session::{BoardEvent, BoardMount, BoardSession};
