//! Read-only lookups for the rendering layer.

use crate::drag::DragCoordinator;
use crate::store::BoardStore;
use kanban_domain::{BoardId, Card};

/// The lifted card for the drag preview, if a drag is under way and the card still exists.
pub fn lifted_card(store: &BoardStore, drag: &DragCoordinator) -> Option<Card> {
    drag.lifted_card(store)
}

/// Id of the board that currently holds the card.
pub fn board_of(store: &BoardStore, card_id: &str) -> Option<BoardId> {
    store.locate(card_id).map(|(board_id, _)| board_id)
}

/// Every loaded card, in board order and then position order. Cards of boards
/// missing from the board list come last.
pub fn all_cards(store: &BoardStore) -> Vec<Card> {
    let mut cards: Vec<Card> = store
        .boards()
        .iter()
        .flat_map(|board| store.cards(&board.id).iter().cloned())
        .collect();

    let mut orphaned: Vec<&BoardId> = store
        .loaded_board_ids()
        .filter(|board_id| store.board(board_id).is_none())
        .collect();
    orphaned.sort();
    for board_id in orphaned {
        cards.extend(store.cards(board_id).iter().cloned());
    }
    cards
}

pub fn cards_for(store: &BoardStore, board_id: &str) -> Vec<Card> {
    store.get(board_id)
}

pub fn find_card(store: &BoardStore, card_id: &str) -> Option<Card> {
    store.card(card_id).cloned()
}

/// `(board_id, card_count)` for each board in the board list.
pub fn board_card_counts(store: &BoardStore) -> Vec<(BoardId, usize)> {
    store
        .boards()
        .iter()
        .map(|board| (board.id.clone(), store.card_count(&board.id)))
        .collect()
}
