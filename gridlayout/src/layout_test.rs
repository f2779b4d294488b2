use super::*;

fn defaults() -> Vec<DefaultCard> {
    vec![
        DefaultCard::new("a", 0, 0, 3, 2).with_type("stat"),
        DefaultCard::new("b", 3, 0, 6, 3).with_type("chart"),
        DefaultCard::new("c", 0, 3, 4, 2),
    ]
}

fn card(card_id: &str, x: u32, y: u32, w: u32, h: u32) -> CardPlacement {
    CardPlacement {
        card_id: card_id.into(),
        card_type: "generic".into(),
        x,
        y,
        w,
        h,
        locked: false,
        aspect_ratio_locked: false,
        aspect_ratio: None,
        min_w: 2,
        min_h: 2,
        max_w: None,
        max_h: None,
    }
}

fn remote_with(board_id: &str, cards: Vec<CardPlacement>) -> UiCustomization {
    UiCustomization {
        boards: vec![BoardCustomization {
            board_id: board_id.into(),
            board_name: board_id.into(),
            grid_cols: 12,
            grid_row_height: 100,
            cards,
            version: Some(3),
        }],
        ..UiCustomization::default()
    }
}

fn loaded_defaults() -> LayoutState {
    let mut state = LayoutState::new("dashboard", "Dashboard");
    state.reconcile(None, &defaults());
    state
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn new_state_is_uninitialized_and_cannot_save() {
    let state = LayoutState::new("dashboard", "Dashboard");
    assert_eq!(state.phase(), LayoutPhase::Uninitialized);
    assert!(!state.is_initialized());
    assert!(state.build_customization().is_none());
}

#[test]
fn begin_load_moves_to_loading_only_once() {
    let mut state = LayoutState::new("dashboard", "Dashboard");
    state.begin_load();
    assert_eq!(state.phase(), LayoutPhase::Loading);
    state.reconcile(None, &defaults());
    state.begin_load();
    assert_eq!(state.phase(), LayoutPhase::Idle);
}

#[test]
fn finish_saving_returns_to_idle() {
    let mut state = loaded_defaults();
    state.mark_saving();
    assert!(state.is_saving());
    state.finish_saving();
    assert_eq!(state.phase(), LayoutPhase::Idle);
}

// =============================================================================
// Reconcile
// =============================================================================

#[test]
fn reconcile_without_remote_adopts_defaults_verbatim() {
    let mut state = LayoutState::new("dashboard", "Dashboard");
    let outcome = state.reconcile(None, &[DefaultCard::new("a", 0, 0, 3, 2).with_type("stat")]);

    assert_eq!(outcome, ReconcileOutcome::Applied(LayoutSource::Default));
    assert_eq!(state.layout(), &[DefaultCard::new("a", 0, 0, 3, 2).to_grid_item()]);
    assert_eq!(state.card_type("a"), Some("stat"));
    assert!(state.locked_cards().is_empty());
    assert!(state.ratio_lock("a").is_none());
    assert!(state.is_initialized());
}

#[test]
fn reconcile_with_empty_board_entry_falls_back_to_defaults() {
    let mut state = LayoutState::new("dashboard", "Dashboard");
    let remote = remote_with("dashboard", Vec::new());
    let outcome = state.reconcile(Some(&remote), &defaults());
    assert_eq!(outcome, ReconcileOutcome::Applied(LayoutSource::Default));
    assert_eq!(state.layout().len(), 3);
    assert_eq!(state.remote_version(), None);
}

#[test]
fn reconcile_ignores_other_boards() {
    let mut state = LayoutState::new("dashboard", "Dashboard");
    let remote = remote_with("vision-board", vec![card("x", 0, 0, 12, 4)]);
    state.reconcile(Some(&remote), &defaults());
    assert!(state.item("x").is_none());
    assert!(state.item("a").is_some());
}

#[test]
fn reconcile_adopts_stacked_remote_cards_exactly() {
    let mut state = LayoutState::new("vision-board", "Vision");
    let remote = remote_with("vision-board", vec![card("top", 0, 0, 12, 4), card("bottom", 0, 4, 12, 3)]);

    let outcome = state.reconcile(Some(&remote), &defaults());

    assert_eq!(outcome, ReconcileOutcome::Applied(LayoutSource::Remote));
    let layout = state.layout();
    assert_eq!(layout.len(), 2);
    assert_eq!((layout[0].x, layout[0].y, layout[0].w, layout[0].h), (0, 0, 12, 4));
    assert_eq!((layout[1].x, layout[1].y, layout[1].w, layout[1].h), (0, 4, 12, 3));
    assert_eq!(state.remote_version(), Some(3));
}

#[test]
fn reconcile_restores_locks_and_types() {
    let mut locked = card("a", 0, 0, 4, 2);
    locked.locked = true;
    locked.card_type = "calendar".into();
    let mut ratio = card("b", 4, 0, 6, 3);
    ratio.aspect_ratio_locked = true;
    let mut stored_ratio = card("c", 0, 2, 4, 4);
    stored_ratio.aspect_ratio_locked = true;
    stored_ratio.aspect_ratio = Some(1.5);

    let mut state = LayoutState::new("dashboard", "Dashboard");
    state.reconcile(Some(&remote_with("dashboard", vec![locked, ratio, stored_ratio])), &[]);

    assert!(state.locked_cards().contains("a"));
    assert!(state.item("a").unwrap().locked);
    assert_eq!(state.card_type("a"), Some("calendar"));
    assert_eq!(state.ratio_lock("b"), Some(2.0));
    assert_eq!(state.ratio_lock("c"), Some(1.5));
    assert!(state.ratio_lock("a").is_none());
}

#[test]
fn reconcile_reads_zero_min_as_default() {
    let mut zero_min = card("a", 0, 0, 4, 2);
    zero_min.min_w = 0;
    zero_min.min_h = 0;
    let mut state = LayoutState::new("dashboard", "Dashboard");
    state.reconcile(Some(&remote_with("dashboard", vec![zero_min])), &[]);
    let item = state.item("a").unwrap();
    assert_eq!((item.min_w, item.min_h), (2, 2));
}

#[test]
fn reconcile_skips_ratio_lock_for_zero_height_card() {
    let mut flat = card("a", 0, 0, 4, 0);
    flat.aspect_ratio_locked = true;
    let mut state = LayoutState::new("dashboard", "Dashboard");
    state.reconcile(Some(&remote_with("dashboard", vec![flat])), &[]);
    assert!(state.ratio_lock("a").is_none());
}

#[test]
fn reconcile_is_idempotent() {
    let mut ratio = card("b", 4, 0, 6, 3);
    ratio.aspect_ratio_locked = true;
    let remote = remote_with("dashboard", vec![card("a", 0, 0, 4, 2), ratio]);
    let mut state = LayoutState::new("dashboard", "Dashboard");

    state.reconcile(Some(&remote), &defaults());
    let first_layout = state.layout().to_vec();
    let first_types = state.card_types().clone();
    state.reconcile(Some(&remote), &defaults());

    assert_eq!(state.layout(), first_layout.as_slice());
    assert_eq!(state.card_types(), &first_types);
}

#[test]
fn reconcile_is_skipped_while_saving() {
    let mut state = loaded_defaults();
    let before = state.layout().to_vec();
    state.mark_saving();

    let remote = remote_with("dashboard", vec![card("z", 0, 0, 12, 6)]);
    let outcome = state.reconcile(Some(&remote), &defaults());

    assert_eq!(outcome, ReconcileOutcome::SkippedWhileSaving);
    assert_eq!(state.layout(), before.as_slice());
    assert!(state.is_saving());
}

// =============================================================================
// Drag / resize
// =============================================================================

#[test]
fn apply_drag_or_resize_replaces_layout_wholesale() {
    let mut state = loaded_defaults();
    let mut moved = state.layout().to_vec();
    moved[0].x = 9;
    moved.truncate(2);
    state.apply_drag_or_resize(moved.clone());
    assert_eq!(state.layout(), moved.as_slice());
}

#[test]
fn constrain_resize_passes_through_without_lock() {
    let state = loaded_defaults();
    let old = state.item("b").unwrap().clone();
    let mut new = old.clone();
    new.w = 8;
    assert!(!state.constrain_resize(&old, &mut new));
    assert_eq!((new.w, new.h), (8, 3));
}

#[test]
fn constrain_resize_width_change_recomputes_height() {
    let mut state = loaded_defaults();
    state.toggle_ratio_lock("b", true, Some(2.0)).unwrap();
    let old = state.item("b").unwrap().clone();
    let mut new = old.clone();
    new.w = 10;
    assert!(state.constrain_resize(&old, &mut new));
    assert_eq!((new.w, new.h), (10, 5));
}

#[test]
fn constrain_resize_height_change_recomputes_width() {
    let mut state = loaded_defaults();
    state.toggle_ratio_lock("b", true, Some(2.0)).unwrap();
    let old = state.item("b").unwrap().clone();
    let mut new = old.clone();
    new.h = 4;
    state.constrain_resize(&old, &mut new);
    assert_eq!((new.w, new.h), (8, 4));
}

#[test]
fn constrain_resize_prefers_width_when_both_change() {
    let mut state = loaded_defaults();
    state.toggle_ratio_lock("b", true, Some(2.0)).unwrap();
    let old = state.item("b").unwrap().clone();
    let mut new = old.clone();
    new.w = 12;
    new.h = 2;
    state.constrain_resize(&old, &mut new);
    assert_eq!((new.w, new.h), (12, 6));
}

#[test]
fn constrain_resize_respects_min_height() {
    let mut state = loaded_defaults();
    state.toggle_ratio_lock("b", true, Some(4.0)).unwrap();
    let old = state.item("b").unwrap().clone();
    let mut new = old.clone();
    new.w = 2;
    state.constrain_resize(&old, &mut new);
    assert_eq!(new.h, 2);
}

#[test]
fn ratio_lock_holds_across_width_only_resizes() {
    let mut state = loaded_defaults();
    state.toggle_ratio_lock("b", true, None).unwrap();
    let ratio = state.ratio_lock("b").unwrap();

    for w in [7, 9, 4, 11, 5, 12, 8] {
        let old = state.item("b").unwrap().clone();
        let mut new = old.clone();
        new.w = w;
        let applied = state.apply_ratio_constrained_resize(&old, new);
        let expected = (f64::from(applied.w) / ratio).round();
        assert!((f64::from(applied.h) - expected).abs() <= 1.0, "w={w} h={}", applied.h);
    }
    assert_eq!(state.item("b").unwrap().w, 8);
}

#[test]
fn apply_ratio_constrained_resize_stores_adjusted_item() {
    let mut state = loaded_defaults();
    state.toggle_ratio_lock("a", true, Some(1.5)).unwrap();
    let old = state.item("a").unwrap().clone();
    let mut new = old.clone();
    new.w = 6;
    let applied = state.apply_ratio_constrained_resize(&old, new);
    assert_eq!((applied.w, applied.h), (6, 4));
    assert_eq!(state.item("a").unwrap(), &applied);
}

// =============================================================================
// Settings intents
// =============================================================================

#[test]
fn set_manual_size_applies_within_bounds() {
    let mut state = loaded_defaults();
    let item = state.set_manual_size("a", 5, 4).unwrap();
    assert_eq!((item.w, item.h), (5, 4));
    assert_eq!(state.item("a").unwrap().w, 5);
}

#[test]
fn set_manual_size_clamps_below_min() {
    let mut state = loaded_defaults();
    let item = state.set_manual_size("a", 1, 0).unwrap();
    assert_eq!((item.w, item.h), (2, 2));
}

#[test]
fn set_manual_size_clamps_above_max() {
    let mut state = LayoutState::new("dashboard", "Dashboard");
    let mut bounded = DefaultCard::new("a", 0, 0, 3, 2);
    bounded.max_w = Some(6);
    bounded.max_h = Some(4);
    state.reconcile(None, &[bounded]);
    let item = state.set_manual_size("a", 20, 20).unwrap();
    assert_eq!((item.w, item.h), (6, 4));
}

#[test]
fn set_manual_size_unknown_card_errors() {
    let mut state = loaded_defaults();
    let err = state.set_manual_size("missing", 3, 3).unwrap_err();
    assert_eq!(err, LayoutError::UnknownCard("missing".into()));
}

#[test]
fn toggle_ratio_lock_sets_and_clears() {
    let mut state = loaded_defaults();
    state.toggle_ratio_lock("b", true, Some(1.25)).unwrap();
    assert_eq!(state.ratio_lock("b"), Some(1.25));
    state.toggle_ratio_lock("b", false, None).unwrap();
    assert!(state.ratio_lock("b").is_none());
}

#[test]
fn toggle_ratio_lock_falls_back_to_current_ratio() {
    let mut state = loaded_defaults();
    state.toggle_ratio_lock("b", true, Some(f64::NAN)).unwrap();
    assert_eq!(state.ratio_lock("b"), Some(2.0));
    state.toggle_ratio_lock("a", true, Some(-1.0)).unwrap();
    assert_eq!(state.ratio_lock("a"), Some(1.5));
}

#[test]
fn toggle_lock_in_place_mirrors_static_flag() {
    let mut state = loaded_defaults();
    state.toggle_lock_in_place("a", true).unwrap();
    assert!(state.locked_cards().contains("a"));
    assert!(state.item("a").unwrap().locked);

    state.toggle_lock_in_place("a", false).unwrap();
    assert!(state.locked_cards().is_empty());
    assert!(!state.item("a").unwrap().locked);
}

#[test]
fn toggle_lock_in_place_unknown_card_errors() {
    let mut state = loaded_defaults();
    assert!(state.toggle_lock_in_place("nope", true).is_err());
    assert!(state.locked_cards().is_empty());
}

// =============================================================================
// Save snapshot
// =============================================================================

#[test]
fn build_customization_flattens_state() {
    let mut state = loaded_defaults();
    state.toggle_lock_in_place("a", true).unwrap();
    state.toggle_ratio_lock("b", true, None).unwrap();

    let board = state.build_customization().unwrap();
    assert_eq!(board.board_id, "dashboard");
    assert_eq!(board.board_name, "Dashboard");
    assert_eq!((board.grid_cols, board.grid_row_height), (12, 100));
    assert_eq!(board.cards.len(), 3);

    let a = board.card("a").unwrap();
    assert!(a.locked);
    assert_eq!(a.card_type, "stat");
    assert!(!a.aspect_ratio_locked);

    let b = board.card("b").unwrap();
    assert!(b.aspect_ratio_locked);
    assert_eq!(b.aspect_ratio, Some(2.0));

    let c = board.card("c").unwrap();
    assert_eq!(c.card_type, "generic");
    assert_eq!((c.min_w, c.min_h), (2, 2));
}

#[test]
fn build_customization_requires_cards() {
    let mut state = LayoutState::new("empty", "Empty");
    state.reconcile(None, &[]);
    assert!(state.is_initialized());
    assert!(state.build_customization().is_none());
}

#[test]
fn build_customization_uses_configured_grid_and_version() {
    let mut state = LayoutState::new("dashboard", "Dashboard").with_grid(24, 50);
    state.reconcile(Some(&remote_with("dashboard", vec![card("a", 0, 0, 4, 2)])), &[]);
    state.record_saved_version(None);
    assert_eq!(state.remote_version(), Some(3));
    state.record_saved_version(Some(4));

    let board = state.build_customization().unwrap();
    assert_eq!((board.grid_cols, board.grid_row_height), (24, 50));
    assert_eq!(board.version, Some(4));
}

#[test]
fn saved_then_reconciled_board_round_trips_locks() {
    let mut state = loaded_defaults();
    state.toggle_lock_in_place("c", true).unwrap();
    state.toggle_ratio_lock("a", true, Some(1.5)).unwrap();
    let board = state.build_customization().unwrap();
    let remote = UiCustomization { boards: vec![board], ..UiCustomization::default() };

    let mut fresh = LayoutState::new("dashboard", "Dashboard");
    fresh.reconcile(Some(&remote), &[]);
    assert_eq!(fresh.layout(), state.layout());
    assert_eq!(fresh.ratio_lock("a"), Some(1.5));
    assert!(fresh.locked_cards().contains("c"));
}

// =============================================================================
// Render contract
// =============================================================================

#[test]
fn card_slots_follow_layout_order_with_fallbacks() {
    let mut state = loaded_defaults();
    state.toggle_lock_in_place("b", true).unwrap();
    state.toggle_ratio_lock("a", true, Some(1.5)).unwrap();

    let slots = state.card_slots(4);
    assert_eq!(slots.len(), 4);
    assert_eq!(slots[0].card_id, "a");
    assert!(slots[0].ratio_locked);
    assert_eq!(slots[0].ratio, Some(1.5));
    assert!(slots[1].locked_in_place);
    assert_eq!((slots[2].w, slots[2].h), (4, 2));
    assert_eq!(slots[3].card_id, "card-3");
    assert_eq!((slots[3].w, slots[3].h), (3, 2));
}

#[test]
fn round_dimension_guards_non_finite() {
    assert_eq!(round_dimension(f64::NAN), 0);
    assert_eq!(round_dimension(-2.0), 0);
    assert_eq!(round_dimension(2.5), 3);
}
