//! Pointer gesture handling for cards.
//!
//! The coordinator owns at most one drag session. It never mutates the store;
//! a drop is turned into a [`MoveIntent`] for the mutation engine.

use crate::store::BoardStore;
use kanban_core::DragConfig;
use kanban_domain::{BoardId, Card, CardId, MoveIntent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// What the pointer is over. Boards append, cards insert at their index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    Board(BoardId),
    Card(CardId),
}

impl DropTarget {
    /// Map an opaque droppable id onto a board or a card.
    pub fn classify(id: &str, store: &BoardStore) -> Option<Self> {
        if store.has_board(id) {
            Some(Self::Board(id.to_string()))
        } else if store.card(id).is_some() {
            Some(Self::Card(id.to_string()))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    /// Pointer is down on a card but has not travelled far enough.
    Pending { card_id: CardId, origin: Point },
    Dragging {
        card_id: CardId,
        over: Option<DropTarget>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropResolution {
    Move(MoveIntent),
    /// Dropped where it already was.
    NoOp,
    /// Released over nothing.
    Cancelled,
    /// The lifted card or the target vanished during the drag.
    Aborted,
    /// No drag was under way.
    NotDragging,
}

#[derive(Debug, Default)]
pub struct DragCoordinator {
    threshold_px: i32,
    state: DragState,
    /// Board of the last hovered target, used when a hovered card disappears.
    anchor_board: Option<BoardId>,
}

impl DragCoordinator {
    pub fn new(config: &DragConfig) -> Self {
        Self {
            threshold_px: config.threshold_px.max(0),
            state: DragState::Idle,
            anchor_board: None,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn pointer_down(&mut self, card_id: impl Into<CardId>, origin: Point) {
        self.anchor_board = None;
        self.state = DragState::Pending {
            card_id: card_id.into(),
            origin,
        };
    }

    /// Returns whether a drag is under way after this movement.
    pub fn pointer_move(&mut self, point: Point) -> bool {
        if let DragState::Pending { card_id, origin } = &self.state {
            let dx = (point.x - origin.x).abs();
            let dy = (point.y - origin.y).abs();
            if dx >= self.threshold_px || dy >= self.threshold_px {
                let card_id = card_id.clone();
                self.start_drag(card_id);
            }
        }
        self.is_dragging()
    }

    /// Lift a card directly, replacing any previous session.
    pub fn start_drag(&mut self, card_id: impl Into<CardId>) {
        let card_id = card_id.into();
        tracing::debug!("Drag started for card {}", card_id);
        self.anchor_board = None;
        self.state = DragState::Dragging {
            card_id,
            over: None,
        };
    }

    pub fn hover(&mut self, target: Option<DropTarget>, store: &BoardStore) {
        let DragState::Dragging { over, .. } = &mut self.state else {
            return;
        };
        match &target {
            Some(DropTarget::Board(board_id)) => self.anchor_board = Some(board_id.clone()),
            Some(DropTarget::Card(card_id)) => {
                if let Some((board_id, _)) = store.locate(card_id) {
                    self.anchor_board = Some(board_id);
                }
            }
            None => {}
        }
        *over = target;
    }

    pub fn hovered(&self) -> Option<&DropTarget> {
        match &self.state {
            DragState::Dragging { over, .. } => over.as_ref(),
            _ => None,
        }
    }

    /// Drop over whatever was last hovered.
    pub fn release(&mut self, store: &BoardStore) -> DropResolution {
        let target = self.hovered().cloned();
        self.resolve_drop(target, store)
    }

    /// Translate a drop into a move intent. Always ends the session.
    pub fn resolve_drop(&mut self, target: Option<DropTarget>, store: &BoardStore) -> DropResolution {
        let state = std::mem::take(&mut self.state);
        let anchor = self.anchor_board.take();

        let DragState::Dragging { card_id, .. } = state else {
            return DropResolution::NotDragging;
        };
        let Some(target) = target else {
            tracing::debug!("Drag of card {} cancelled", card_id);
            return DropResolution::Cancelled;
        };
        let Some((from_board_id, from_index)) = store.locate(&card_id) else {
            tracing::debug!("Lifted card {} vanished during drag", card_id);
            return DropResolution::Aborted;
        };

        let (to_board_id, mut new_index) = match target {
            DropTarget::Board(board_id) => {
                let len = store.card_count(&board_id);
                (board_id, len)
            }
            DropTarget::Card(target_id) => match store.locate(&target_id) {
                Some(found) => found,
                None => match anchor {
                    Some(board_id) => {
                        tracing::debug!(
                            "Drop target {} vanished, appending to board {}",
                            target_id,
                            board_id
                        );
                        let len = store.card_count(&board_id);
                        (board_id, len)
                    }
                    None => {
                        tracing::debug!("Drop target {} vanished with no known board", target_id);
                        return DropResolution::Aborted;
                    }
                },
            },
        };

        if to_board_id == from_board_id {
            // The card is removed before reinsertion, so the last slot is len - 1.
            new_index = new_index.min(store.card_count(&from_board_id).saturating_sub(1));
            if new_index == from_index {
                return DropResolution::NoOp;
            }
        }

        DropResolution::Move(MoveIntent {
            card_id,
            from_board_id,
            to_board_id,
            new_index,
        })
    }

    pub fn cancel_drag(&mut self) {
        self.state = DragState::Idle;
        self.anchor_board = None;
    }

    pub fn lifted_card_id(&self) -> Option<&str> {
        match &self.state {
            DragState::Dragging { card_id, .. } => Some(card_id),
            _ => None,
        }
    }

    /// The lifted card as currently stored, for the ghost preview.
    pub fn lifted_card(&self, store: &BoardStore) -> Option<Card> {
        self.lifted_card_id()
            .and_then(|card_id| store.card(card_id))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kanban_domain::Board;

    fn card(id: &str, board: &str, position: i32) -> Card {
        Card::new(id, board, format!("Card {}", id), position)
    }

    fn store() -> BoardStore {
        let mut store = BoardStore::new();
        store.replace_boards(vec![Board::new("a", "env", "A", 0), Board::new("b", "env", "B", 1)]);
        store.replace(
            "a",
            vec![card("c1", "a", 0), card("c2", "a", 1), card("c3", "a", 2)],
        );
        store.replace("b", vec![card("c4", "b", 0)]);
        store
    }

    fn coordinator() -> DragCoordinator {
        DragCoordinator::new(&DragConfig::default())
    }

    fn dragging(card_id: &str) -> DragCoordinator {
        let mut drag = coordinator();
        drag.start_drag(card_id);
        drag
    }

    #[test]
    fn test_small_movement_does_not_start_drag() {
        let mut drag = coordinator();
        drag.pointer_down("c1", Point::new(100, 100));
        assert!(!drag.pointer_move(Point::new(103, 98)));
        assert!(matches!(drag.state(), DragState::Pending { .. }));
        assert!(drag.pointer_move(Point::new(100, 105)));
        assert_eq!(drag.lifted_card_id(), Some("c1"));
    }

    #[test]
    fn test_click_without_drag_resolves_nothing() {
        let store = store();
        let mut drag = coordinator();
        drag.pointer_down("c1", Point::new(0, 0));
        assert_eq!(drag.release(&store), DropResolution::NotDragging);
        assert_eq!(drag.state(), &DragState::Idle);
    }

    #[test]
    fn test_drop_on_same_position_is_noop() {
        let store = store();
        let mut drag = dragging("c2");
        let resolution = drag.resolve_drop(Some(DropTarget::Card("c2".into())), &store);
        assert_eq!(resolution, DropResolution::NoOp);
        assert_eq!(drag.lifted_card_id(), None);
    }

    #[test]
    fn test_drop_last_card_on_own_board_is_noop() {
        let store = store();
        let mut drag = dragging("c3");
        let resolution = drag.resolve_drop(Some(DropTarget::Board("a".into())), &store);
        assert_eq!(resolution, DropResolution::NoOp);
    }

    #[test]
    fn test_drop_on_card_of_other_board() {
        let store = store();
        let mut drag = dragging("c1");
        let resolution = drag.resolve_drop(Some(DropTarget::Card("c4".into())), &store);
        assert_eq!(
            resolution,
            DropResolution::Move(MoveIntent {
                card_id: "c1".into(),
                from_board_id: "a".into(),
                to_board_id: "b".into(),
                new_index: 0,
            })
        );
    }

    #[test]
    fn test_drop_on_board_appends() {
        let store = store();
        let mut drag = dragging("c1");
        match drag.resolve_drop(Some(DropTarget::Board("b".into())), &store) {
            DropResolution::Move(intent) => {
                assert_eq!(intent.to_board_id, "b");
                assert_eq!(intent.new_index, 1);
            }
            other => panic!("expected move, got {:?}", other),
        }
    }

    #[test]
    fn test_drop_without_target_cancels() {
        let store = store();
        let mut drag = dragging("c1");
        assert_eq!(drag.resolve_drop(None, &store), DropResolution::Cancelled);
        assert_eq!(drag.state(), &DragState::Idle);
    }

    #[test]
    fn test_vanished_lifted_card_aborts() {
        let store = store();
        let mut drag = dragging("ghost");
        let resolution = drag.resolve_drop(Some(DropTarget::Board("b".into())), &store);
        assert_eq!(resolution, DropResolution::Aborted);
    }

    #[test]
    fn test_vanished_target_falls_back_to_hovered_board() {
        let mut store = store();
        let mut drag = dragging("c1");
        drag.hover(Some(DropTarget::Card("c4".into())), &store);
        store.remove("b", "c4");

        match drag.release(&store) {
            DropResolution::Move(intent) => {
                assert_eq!(intent.to_board_id, "b");
                assert_eq!(intent.new_index, 0);
            }
            other => panic!("expected move, got {:?}", other),
        }
    }

    #[test]
    fn test_vanished_target_without_anchor_aborts() {
        let store = store();
        let mut drag = dragging("c1");
        let resolution = drag.resolve_drop(Some(DropTarget::Card("ghost".into())), &store);
        assert_eq!(resolution, DropResolution::Aborted);
    }

    #[test]
    fn test_classify_target_ids() {
        let store = store();
        assert_eq!(
            DropTarget::classify("a", &store),
            Some(DropTarget::Board("a".into()))
        );
        assert_eq!(
            DropTarget::classify("c4", &store),
            Some(DropTarget::Card("c4".into()))
        );
        assert_eq!(DropTarget::classify("nope", &store), None);
    }

    #[test]
    fn test_lifted_card_and_cancel() {
        let store = store();
        let mut drag = dragging("c4");
        assert_eq!(drag.lifted_card(&store).map(|c| c.id), Some("c4".to_string()));
        drag.cancel_drag();
        assert!(drag.lifted_card(&store).is_none());
    }
}
