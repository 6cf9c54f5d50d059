//! The single owned container for board and card state.
//!
//! All collection mutations, from every writer, go through the id-keyed
//! primitives here. Each mutating call bumps [`BoardStore::version`] and
//! notifies [`BoardStore::subscribe`] receivers so derived views can be
//! recomputed.

use crate::collection::OrderedList;
use kanban_domain::{
    Board, BoardId, BoardPatch, BoardsSnapshot, Card, CardPatch, EnvironmentId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug)]
pub struct BoardStore {
    environment_id: Option<EnvironmentId>,
    boards: OrderedList<Board>,
    cards: HashMap<BoardId, OrderedList<Card>>,
    version: u64,
    changes: watch::Sender<u64>,
}

impl Default for BoardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            environment_id: None,
            boards: OrderedList::new(),
            cards: HashMap::new(),
            version: 0,
            changes,
        }
    }

    // ---- card collection primitives ----

    /// Cards of a board in rendered order; empty for an unknown board.
    pub fn get(&self, board_id: &str) -> Vec<Card> {
        self.cards(board_id).to_vec()
    }

    pub fn cards(&self, board_id: &str) -> &[Card] {
        self.cards
            .get(board_id)
            .map(OrderedList::as_slice)
            .unwrap_or(&[])
    }

    /// Replace a board's collection with fetched ground truth.
    pub fn replace(&mut self, board_id: &str, cards: Vec<Card>) {
        let cards = cards
            .into_iter()
            .map(|mut card| {
                card.board_id = board_id.to_string();
                card
            })
            .collect();
        self.cards
            .insert(board_id.to_string(), OrderedList::from_unsorted(cards));
        self.touch();
    }

    /// Insert at `min(index, len)`; the card adopts `board_id`. Returns the index used.
    pub fn insert(&mut self, board_id: &str, mut card: Card, index: usize) -> usize {
        card.board_id = board_id.to_string();
        let used = self
            .cards
            .entry(board_id.to_string())
            .or_default()
            .insert(card, index);
        self.touch();
        used
    }

    pub fn remove(&mut self, board_id: &str, card_id: &str) -> Option<Card> {
        let (_, card) = self.cards.get_mut(board_id)?.remove(card_id)?;
        self.touch();
        Some(card)
    }

    /// Shallow-merge `patch` into the card. `false` when the card is not on that board.
    pub fn patch(&mut self, board_id: &str, card_id: &str, patch: CardPatch) -> bool {
        let Some(list) = self.cards.get_mut(board_id) else {
            return false;
        };
        match list.update(card_id, |card| card.apply_patch(patch)) {
            Some(changed) => {
                if changed {
                    self.touch();
                }
                true
            }
            None => false,
        }
    }

    /// Patch the card wherever it currently lives.
    pub fn patch_anywhere(&mut self, card_id: &str, patch: CardPatch) -> bool {
        match self.locate(card_id) {
            Some((board_id, _)) => self.patch(&board_id, card_id, patch),
            None => false,
        }
    }

    /// Remove the card wherever it currently lives.
    pub fn remove_anywhere(&mut self, card_id: &str) -> Option<Card> {
        let (board_id, _) = self.locate(card_id)?;
        self.remove(&board_id, card_id)
    }

    /// Relocate a card with remove + insert. `None` (and no change) when the
    /// card is not in `from_board_id`. Returns the destination index used.
    pub fn move_card(
        &mut self,
        card_id: &str,
        from_board_id: &str,
        to_board_id: &str,
        new_index: usize,
    ) -> Option<usize> {
        let card = self.remove(from_board_id, card_id)?;
        Some(self.insert(to_board_id, card, new_index))
    }

    /// Swap the card `old_id` for `card` at the same index (server confirmation
    /// of a temporary card). `false` when `old_id` is gone.
    pub fn replace_card(&mut self, old_id: &str, card: Card) -> bool {
        let Some((board_id, index)) = self.locate(old_id) else {
            return false;
        };
        if let Some(list) = self.cards.get_mut(&board_id) {
            list.remove(old_id);
            let mut card = card;
            card.board_id = board_id.clone();
            list.insert(card, index);
            self.touch();
            return true;
        }
        false
    }

    pub fn locate(&self, card_id: &str) -> Option<(BoardId, usize)> {
        self.cards.iter().find_map(|(board_id, list)| {
            list.index_of(card_id).map(|index| (board_id.clone(), index))
        })
    }

    pub fn index_of(&self, board_id: &str, card_id: &str) -> Option<usize> {
        self.cards.get(board_id)?.index_of(card_id)
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.cards.values().find_map(|list| list.get(card_id))
    }

    pub fn card_count(&self, board_id: &str) -> usize {
        self.cards.get(board_id).map_or(0, OrderedList::len)
    }

    /// Whether this board's cards have been fetched and are held in memory.
    pub fn is_loaded(&self, board_id: &str) -> bool {
        self.cards.contains_key(board_id)
    }

    pub fn loaded_board_ids(&self) -> impl Iterator<Item = &BoardId> {
        self.cards.keys()
    }

    /// Drop a board's in-memory collection when its view is unmounted.
    pub fn discard_board(&mut self, board_id: &str) -> bool {
        let removed = self.cards.remove(board_id).is_some();
        if removed {
            self.touch();
        }
        removed
    }

    // ---- board list primitives ----

    pub fn environment_id(&self) -> Option<&str> {
        self.environment_id.as_deref()
    }

    /// Switch to another environment. All held state belongs to the old one and is dropped.
    pub fn set_environment(&mut self, environment_id: &str) {
        if self.environment_id.as_deref() == Some(environment_id) {
            return;
        }
        self.environment_id = Some(environment_id.to_string());
        self.boards = OrderedList::new();
        self.cards.clear();
        self.touch();
    }

    pub fn boards(&self) -> &[Board] {
        self.boards.as_slice()
    }

    pub fn board(&self, board_id: &str) -> Option<&Board> {
        self.boards.get(board_id)
    }

    pub fn has_board(&self, board_id: &str) -> bool {
        self.boards.contains(board_id) || self.cards.contains_key(board_id)
    }

    pub fn board_index(&self, board_id: &str) -> Option<usize> {
        self.boards.index_of(board_id)
    }

    pub fn replace_boards(&mut self, boards: Vec<Board>) {
        self.boards = OrderedList::from_unsorted(boards);
        self.touch();
    }

    pub fn insert_board(&mut self, board: Board, index: usize) -> usize {
        let used = self.boards.insert(board, index);
        self.touch();
        used
    }

    pub fn patch_board(&mut self, board_id: &str, patch: BoardPatch) -> bool {
        match self.boards.update(board_id, |board| board.apply_patch(patch)) {
            Some(changed) => {
                if changed {
                    self.touch();
                }
                true
            }
            None => false,
        }
    }

    pub fn move_board(&mut self, board_id: &str, new_index: usize) -> Option<usize> {
        let (_, board) = self.boards.remove(board_id)?;
        Some(self.insert_board(board, new_index))
    }

    pub fn replace_board(&mut self, old_id: &str, board: Board) -> bool {
        let Some((index, _)) = self.boards.remove(old_id) else {
            return false;
        };
        let new_id = board.id.clone();
        self.boards.insert(board, index);
        if old_id != new_id {
            if let Some(cards) = self.cards.remove(old_id) {
                let cards = cards
                    .into_vec()
                    .into_iter()
                    .map(|mut card| {
                        card.board_id = new_id.clone();
                        card
                    })
                    .collect();
                self.cards.insert(new_id, OrderedList::from_unsorted(cards));
            }
        }
        self.touch();
        true
    }

    /// Remove a board together with its card collection.
    pub fn remove_board(&mut self, board_id: &str) -> Option<Board> {
        let removed = self.boards.remove(board_id).map(|(_, board)| board);
        let had_cards = self.cards.remove(board_id).is_some();
        if removed.is_some() || had_cards {
            self.touch();
        }
        removed
    }

    // ---- snapshots and change tracking ----

    pub fn snapshot(&self) -> BoardsSnapshot {
        BoardsSnapshot {
            boards: self.boards.to_vec(),
            cards: self
                .cards
                .iter()
                .map(|(board_id, list)| (board_id.clone(), list.to_vec()))
                .collect(),
        }
    }

    pub fn restore(&mut self, snapshot: BoardsSnapshot) {
        self.boards = OrderedList::from_unsorted(snapshot.boards);
        self.cards = snapshot
            .cards
            .into_iter()
            .map(|(board_id, cards)| (board_id, OrderedList::from_unsorted(cards)))
            .collect();
        self.touch();
    }

    /// True when every board list and card list has positions `0..n`.
    pub fn is_dense(&self) -> bool {
        self.boards.is_dense() && self.cards.values().all(OrderedList::is_dense)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Receiver that observes the store version after every change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn touch(&mut self) {
        self.version += 1;
        self.changes.send_replace(self.version);
    }
}

/// Cloneable handle to the one [`BoardStore`] shared by every component.
///
/// Access is closure-scoped so the lock can never be held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<BoardStore>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<R>(&self, f: impl FnOnce(&BoardStore) -> R) -> R {
        f(&self.inner.lock())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut BoardStore) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.read(BoardStore::subscribe)
    }
}
