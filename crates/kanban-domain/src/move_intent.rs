use crate::{BoardId, CardId};

/// A requested relocation of one card, produced by a drop and consumed by the
/// mutation engine. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveIntent {
    pub card_id: CardId,
    pub from_board_id: BoardId,
    pub to_board_id: BoardId,
    pub new_index: usize,
}
