//! Optimistic mutation engine.
//!
//! Every mutating action is applied to the shared store synchronously, then
//! sent to the server. A confirmation merges server-owned fields into the
//! entity wherever it lives by then; a rejection restores the snapshot taken
//! before the change.
//!
//! Overlapping operations on the same card or board are tracked in an
//! in-flight ledger keyed by a monotonically increasing [`OperationId`]. Only
//! the most recently issued operation for a subject may restore its snapshot.
//! A rejected operation that has already been superseded hands its snapshot
//! down to the next newer pending operation instead.
//!
//! Snapshots cover the whole store, so they are only exact while a single
//! subject has work in flight. A rejection that overlapped another subject's
//! operation restores nothing; the loaded boards are refetched from the server
//! as soon as the ledger drains.

use crate::remote::{KanbanApi, Operation};
use crate::store::SharedStore;
use kanban_core::{KanbanError, KanbanResult};
use kanban_domain::{
    Board, BoardId, BoardPatch, BoardsSnapshot, Card, CardId, CardPatch, EnvironmentId,
    MoveCardRequest, MoveIntent, NewBoard, NewCard, TEMPORARY_ID_PREFIX,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub type OperationId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Applied locally and confirmed by the server.
    Moved { board_id: BoardId, index: usize },
    /// The card was not in the claimed source board; nothing happened.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Subject {
    Card(CardId),
    Board(BoardId),
}

#[derive(Debug)]
struct PendingOp {
    id: OperationId,
    baseline: BoardsSnapshot,
    /// Another subject had an operation in flight during this one's lifetime.
    entangled: bool,
}

#[derive(Debug, Default)]
struct SubjectOps {
    latest: OperationId,
    /// Ascending by id.
    pending: Vec<PendingOp>,
}

#[derive(Debug, PartialEq)]
enum Rollback {
    Restore(BoardsSnapshot),
    Superseded,
    Resync,
}

#[derive(Debug, Clone, PartialEq)]
struct Resync {
    environment_id: Option<EnvironmentId>,
}

#[derive(Debug, Default)]
struct InFlightLedger {
    next_id: OperationId,
    subjects: HashMap<Subject, SubjectOps>,
    resync: Option<Resync>,
}

impl InFlightLedger {
    fn begin(&mut self, subject: Subject, baseline: BoardsSnapshot) -> OperationId {
        self.next_id += 1;
        let id = self.next_id;

        let mut entangled = false;
        for (other, ops) in self.subjects.iter_mut() {
            if *other != subject && !ops.pending.is_empty() {
                entangled = true;
                for op in &mut ops.pending {
                    op.entangled = true;
                }
            }
        }

        let ops = self.subjects.entry(subject).or_default();
        ops.latest = id;
        ops.pending.push(PendingOp {
            id,
            baseline,
            entangled,
        });
        id
    }

    /// Settle a confirmed operation. Returns whether it was the latest issued
    /// for its subject.
    fn confirm(&mut self, subject: &Subject, id: OperationId) -> bool {
        let Some(ops) = self.subjects.get_mut(subject) else {
            return true;
        };
        ops.pending.retain(|op| op.id != id);
        let latest = ops.latest == id;
        if ops.pending.is_empty() {
            self.subjects.remove(subject);
        }
        latest
    }

    /// Settle a rejected operation and decide how the store recovers.
    fn reject(
        &mut self,
        subject: &Subject,
        id: OperationId,
        environment_id: Option<&str>,
    ) -> Rollback {
        let Some(ops) = self.subjects.get_mut(subject) else {
            return Rollback::Superseded;
        };
        let Some(index) = ops.pending.iter().position(|op| op.id == id) else {
            return Rollback::Superseded;
        };
        let failed = ops.pending.remove(index);
        let was_latest = ops.latest == id;
        if was_latest {
            // State is back to what it was before this op, so the newest
            // still-pending op is the latest again.
            ops.latest = ops.pending.last().map_or(0, |op| op.id);
        }

        let rollback = if failed.entangled || self.resync.is_some() {
            self.resync.get_or_insert_with(|| Resync {
                environment_id: environment_id.map(str::to_string),
            });
            Rollback::Resync
        } else if was_latest {
            Rollback::Restore(failed.baseline)
        } else {
            if let Some(next) = ops.pending.get_mut(index) {
                next.baseline = failed.baseline;
            }
            Rollback::Superseded
        };

        if ops.pending.is_empty() {
            self.subjects.remove(subject);
        }
        rollback
    }

    /// Hand out a scheduled resync once nothing is in flight.
    fn take_resync(&mut self) -> Option<Resync> {
        if self.pending_count() == 0 {
            self.resync.take()
        } else {
            None
        }
    }

    fn pending_count(&self) -> usize {
        self.subjects.values().map(|ops| ops.pending.len()).sum()
    }
}

#[derive(Clone)]
pub struct MutationEngine {
    store: SharedStore,
    api: Arc<dyn KanbanApi>,
    ledger: Arc<Mutex<InFlightLedger>>,
}

impl MutationEngine {
    pub fn new(store: SharedStore, api: Arc<dyn KanbanApi>) -> Self {
        Self {
            store,
            api,
            ledger: Arc::new(Mutex::new(InFlightLedger::default())),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Number of optimistic operations awaiting a server response.
    pub fn in_flight(&self) -> usize {
        self.ledger.lock().pending_count()
    }

    // ---- fetches ----

    /// Fetch the boards of an environment and make them the local ground truth.
    pub async fn load_boards(&self, environment_id: &str) -> KanbanResult<Vec<Board>> {
        let boards = self.api.fetch_boards(environment_id).await?;
        let loaded = self.store.write(|store| {
            store.set_environment(environment_id);
            store.replace_boards(boards);
            store.boards().to_vec()
        });
        tracing::debug!(
            "Loaded {} boards for environment {}",
            loaded.len(),
            environment_id
        );
        Ok(loaded)
    }

    /// Fetch a board's cards and replace its collection. Also the recovery
    /// path after persistent failures.
    pub async fn load_cards(&self, board_id: &str) -> KanbanResult<Vec<Card>> {
        let cards = self.api.fetch_cards_for_board(board_id).await?;
        let loaded = self.store.write(|store| {
            store.replace(board_id, cards);
            store.get(board_id)
        });
        tracing::debug!("Loaded {} cards for board {}", loaded.len(), board_id);
        Ok(loaded)
    }

    // ---- cards ----

    pub async fn move_card(&self, intent: MoveIntent) -> KanbanResult<MoveOutcome> {
        if intent.card_id.starts_with(TEMPORARY_ID_PREFIX) {
            tracing::debug!("Card {} awaits creation; move skipped", intent.card_id);
            return Ok(MoveOutcome::Skipped);
        }

        let applied = self.store.write(|store| {
            store.index_of(&intent.from_board_id, &intent.card_id)?;
            let baseline = store.snapshot();
            let environment = store.environment_id().map(str::to_string);
            let index = store.move_card(
                &intent.card_id,
                &intent.from_board_id,
                &intent.to_board_id,
                intent.new_index,
            )?;
            Some((baseline, environment, index))
        });
        let Some((baseline, environment, index)) = applied else {
            tracing::debug!(
                "Card {} not in board {}; move skipped",
                intent.card_id,
                intent.from_board_id
            );
            return Ok(MoveOutcome::Skipped);
        };

        let subject = Subject::Card(intent.card_id.clone());
        let op = self.ledger.lock().begin(subject.clone(), baseline);
        let request = MoveCardRequest {
            target_board_id: intent.to_board_id.clone(),
            new_position: index as i32,
        };

        match self.api.move_card(&intent.card_id, request).await {
            Ok(response) => {
                let latest = self.ledger.lock().confirm(&subject, op);
                if latest && self.same_environment(environment.as_deref()) {
                    self.store.write(|store| {
                        match store.locate(&response.id) {
                            Some((board_id, current))
                                if board_id != response.board_id
                                    || current as i32 != response.position =>
                            {
                                tracing::debug!(
                                    "Server placed card {} at {}#{}, keeping local {}#{}",
                                    response.id,
                                    response.board_id,
                                    response.position,
                                    board_id,
                                    current
                                );
                            }
                            _ => {}
                        }
                        if let Some(updated_at) = response.updated_at {
                            let newer = store
                                .card(&response.id)
                                .is_some_and(|card| card.updated_at < updated_at);
                            if newer {
                                store.patch_anywhere(
                                    &response.id,
                                    CardPatch {
                                        updated_at: Some(updated_at),
                                        ..CardPatch::default()
                                    },
                                );
                            }
                        }
                    });
                }
                self.resync_if_idle().await;
                Ok(MoveOutcome::Moved {
                    board_id: intent.to_board_id,
                    index,
                })
            }
            Err(err) => {
                self.settle_rejection(
                    &subject,
                    op,
                    environment.as_deref(),
                    Operation::MoveCard,
                    &err,
                )
                .await;
                Err(err)
            }
        }
    }

    /// Insert a temporary card at the end of the board, then swap in the
    /// server's card on confirmation. On failure the temporary card is removed.
    pub async fn create_card(&self, mut payload: NewCard) -> KanbanResult<Card> {
        let temporary = self.store.write(|store| {
            let position = store.card_count(&payload.board_id);
            let mut card = Card::temporary(&payload.board_id, &payload.title, position as i32);
            card.description = payload.description.clone();
            store.insert(&payload.board_id, card.clone(), position);
            card
        });
        payload.position = temporary.position;

        match self.api.create_card(payload).await {
            Ok(card) => {
                self.store.write(|store| {
                    if store.locate(&card.id).is_some() {
                        store.remove_anywhere(&temporary.id);
                    } else if !store.replace_card(&temporary.id, card.clone()) {
                        tracing::debug!(
                            "Temporary card {} vanished before confirmation",
                            temporary.id
                        );
                    }
                });
                Ok(card)
            }
            Err(err) => {
                tracing::warn!("{} failed, discarding {}: {}", Operation::CreateCard, temporary.id, err);
                self.store.write(|store| store.remove_anywhere(&temporary.id));
                Err(err)
            }
        }
    }

    /// Returns the card as it stands locally after the update, or `None` when
    /// the card is unknown (nothing is sent).
    pub async fn update_card(&self, card_id: &str, patch: CardPatch) -> KanbanResult<Option<Card>> {
        if card_id.starts_with(TEMPORARY_ID_PREFIX) {
            tracing::debug!("Card {} awaits creation; update skipped", card_id);
            return Ok(None);
        }

        let applied = self.store.write(|store| {
            store.card(card_id)?;
            let baseline = store.snapshot();
            let environment = store.environment_id().map(str::to_string);
            store.patch_anywhere(card_id, patch.clone());
            Some((baseline, environment))
        });
        let Some((baseline, environment)) = applied else {
            tracing::debug!("Card {} not found; update skipped", card_id);
            return Ok(None);
        };

        let subject = Subject::Card(card_id.to_string());
        let op = self.ledger.lock().begin(subject.clone(), baseline);

        match self.api.update_card(card_id, patch).await {
            Ok(server_card) => {
                let latest = self.ledger.lock().confirm(&subject, op);
                let merge = latest && self.same_environment(environment.as_deref());
                if merge {
                    self.store
                        .write(|store| store.patch_anywhere(card_id, server_card.content_patch()));
                }
                self.resync_if_idle().await;
                Ok(self.store.read(|store| store.card(card_id).cloned()))
            }
            Err(err) => {
                self.settle_rejection(
                    &subject,
                    op,
                    environment.as_deref(),
                    Operation::UpdateCard,
                    &err,
                )
                .await;
                Err(err)
            }
        }
    }

    /// Returns `false` when the card is unknown (nothing is sent).
    pub async fn delete_card(&self, card_id: &str) -> KanbanResult<bool> {
        if card_id.starts_with(TEMPORARY_ID_PREFIX) {
            tracing::debug!("Card {} awaits creation; delete skipped", card_id);
            return Ok(false);
        }

        let applied = self.store.write(|store| {
            let (board_id, _) = store.locate(card_id)?;
            let baseline = store.snapshot();
            let environment = store.environment_id().map(str::to_string);
            store.remove(&board_id, card_id);
            Some((baseline, environment))
        });
        let Some((baseline, environment)) = applied else {
            tracing::debug!("Card {} not found; delete skipped", card_id);
            return Ok(false);
        };

        let subject = Subject::Card(card_id.to_string());
        let op = self.ledger.lock().begin(subject.clone(), baseline);

        match self.api.delete_card(card_id).await {
            Ok(()) => {
                self.ledger.lock().confirm(&subject, op);
                self.resync_if_idle().await;
                Ok(true)
            }
            Err(err) => {
                self.settle_rejection(
                    &subject,
                    op,
                    environment.as_deref(),
                    Operation::DeleteCard,
                    &err,
                )
                .await;
                Err(err)
            }
        }
    }

    // ---- boards ----

    pub async fn create_board(&self, mut payload: NewBoard) -> KanbanResult<Board> {
        let temporary = self.store.write(|store| {
            let position = store.boards().len();
            let board = Board::new(
                format!("{}{}", TEMPORARY_ID_PREFIX, Uuid::new_v4()),
                &payload.environment_id,
                &payload.name,
                position as i32,
            );
            store.insert_board(board.clone(), position);
            board
        });
        payload.position = temporary.position;

        match self.api.create_board(payload).await {
            Ok(board) => {
                self.store.write(|store| {
                    if store.board(&board.id).is_some() {
                        store.remove_board(&temporary.id);
                    } else if store.replace_board(&temporary.id, board.clone()) {
                        if !store.is_loaded(&board.id) {
                            store.replace(&board.id, Vec::new());
                        }
                    } else {
                        tracing::debug!(
                            "Temporary board {} vanished before confirmation",
                            temporary.id
                        );
                    }
                });
                Ok(board)
            }
            Err(err) => {
                tracing::warn!("{} failed, discarding {}: {}", Operation::CreateBoard, temporary.id, err);
                self.store.write(|store| store.remove_board(&temporary.id));
                Err(err)
            }
        }
    }

    pub async fn update_board(
        &self,
        board_id: &str,
        patch: BoardPatch,
    ) -> KanbanResult<Option<Board>> {
        if board_id.starts_with(TEMPORARY_ID_PREFIX) {
            return Ok(None);
        }

        let applied = self.store.write(|store| {
            store.board(board_id)?;
            let baseline = store.snapshot();
            let environment = store.environment_id().map(str::to_string);
            store.patch_board(board_id, patch.clone());
            Some((baseline, environment))
        });
        let Some((baseline, environment)) = applied else {
            tracing::debug!("Board {} not found; update skipped", board_id);
            return Ok(None);
        };

        let subject = Subject::Board(board_id.to_string());
        let op = self.ledger.lock().begin(subject.clone(), baseline);

        match self.api.update_board(board_id, patch).await {
            Ok(server_board) => {
                let latest = self.ledger.lock().confirm(&subject, op);
                let merge = latest && self.same_environment(environment.as_deref());
                if merge {
                    self.store
                        .write(|store| store.patch_board(board_id, server_board.content_patch()));
                }
                self.resync_if_idle().await;
                Ok(self.store.read(|store| store.board(board_id).cloned()))
            }
            Err(err) => {
                self.settle_rejection(
                    &subject,
                    op,
                    environment.as_deref(),
                    Operation::UpdateBoard,
                    &err,
                )
                .await;
                Err(err)
            }
        }
    }

    /// Remove the board and its cards locally, then on the server.
    pub async fn delete_board(&self, board_id: &str) -> KanbanResult<bool> {
        if board_id.starts_with(TEMPORARY_ID_PREFIX) {
            return Ok(false);
        }

        let applied = self.store.write(|store| {
            store.board(board_id)?;
            let baseline = store.snapshot();
            let environment = store.environment_id().map(str::to_string);
            store.remove_board(board_id);
            Some((baseline, environment))
        });
        let Some((baseline, environment)) = applied else {
            tracing::debug!("Board {} not found; delete skipped", board_id);
            return Ok(false);
        };

        let subject = Subject::Board(board_id.to_string());
        let op = self.ledger.lock().begin(subject.clone(), baseline);

        match self.api.delete_board(board_id).await {
            Ok(()) => {
                self.ledger.lock().confirm(&subject, op);
                self.resync_if_idle().await;
                Ok(true)
            }
            Err(err) => {
                self.settle_rejection(
                    &subject,
                    op,
                    environment.as_deref(),
                    Operation::DeleteBoard,
                    &err,
                )
                .await;
                Err(err)
            }
        }
    }

    // ---- internals ----

    fn same_environment(&self, environment: Option<&str>) -> bool {
        self.store.read(|store| store.environment_id() == environment)
    }

    async fn settle_rejection(
        &self,
        subject: &Subject,
        op: OperationId,
        environment: Option<&str>,
        operation: Operation,
        err: &KanbanError,
    ) {
        let rollback = self.ledger.lock().reject(subject, op, environment);
        match rollback {
            Rollback::Restore(baseline) if self.same_environment(environment) => {
                tracing::warn!("{} rejected, restoring snapshot: {}", operation, err);
                self.store.write(|store| store.restore(baseline));
            }
            Rollback::Restore(_) => {
                tracing::debug!("{} rejected after environment switch: {}", operation, err);
            }
            Rollback::Superseded => {
                tracing::warn!(
                    "{} rejected but superseded by a newer operation: {}",
                    operation,
                    err
                );
            }
            Rollback::Resync => {
                tracing::warn!(
                    "{} rejected while other operations were in flight, scheduling resync: {}",
                    operation,
                    err
                );
            }
        }
        self.resync_if_idle().await;
    }

    /// Refetch the board list and every loaded board once the ledger has
    /// drained after an overlapping rejection.
    async fn resync_if_idle(&self) {
        let Some(resync) = self.ledger.lock().take_resync() else {
            return;
        };
        let current = self
            .store
            .read(|store| store.environment_id().map(str::to_string));
        if current != resync.environment_id {
            tracing::debug!("Environment changed before resync; skipping");
            return;
        }

        let loaded: Vec<BoardId> = self
            .store
            .read(|store| store.loaded_board_ids().cloned().collect());
        tracing::info!("Resyncing {} loaded boards", loaded.len());

        if let Some(environment_id) = &current {
            if let Err(err) = self.load_boards(environment_id).await {
                tracing::warn!("Resync of environment {} failed: {}", environment_id, err);
                return;
            }
        }
        for board_id in loaded {
            match self.load_cards(&board_id).await {
                Ok(_) => {}
                Err(KanbanError::NotFound(_)) => {
                    self.store.write(|store| store.discard_board(&board_id));
                }
                Err(err) => tracing::warn!("Resync of board {} failed: {}", board_id, err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockKanbanApi;
    use crate::store::BoardStore;
    use kanban_domain::MoveCardResponse;

    fn positions(cards: &[Card]) -> Vec<i32> {
        cards.iter().map(|c| c.position).collect()
    }

    fn card(id: &str, board: &str, position: i32) -> Card {
        Card::new(id, board, format!("Card {}", id), position)
    }

    fn ids(store: &BoardStore, board: &str) -> Vec<String> {
        store.cards(board).iter().map(|c| c.id.clone()).collect()
    }

    fn seeded_store() -> SharedStore {
        let store = SharedStore::new();
        store.write(|s| {
            s.set_environment("env");
            s.replace("a", vec![card("card1", "a", 0), card("card2", "a", 1)]);
            s.replace("b", vec![]);
        });
        store
    }

    fn intent(card: &str, from: &str, to: &str, index: usize) -> MoveIntent {
        MoveIntent {
            card_id: card.into(),
            from_board_id: from.into(),
            to_board_id: to.into(),
            new_index: index,
        }
    }

    fn engine(store: &SharedStore, api: MockKanbanApi) -> MutationEngine {
        MutationEngine::new(store.clone(), Arc::new(api))
    }

    #[tokio::test]
    async fn test_rejected_move_restores_exact_snapshot() {
        let store = seeded_store();
        let before = store.read(BoardStore::snapshot);

        let mut api = MockKanbanApi::new();
        api.expect_move_card()
            .times(1)
            .returning(|_, _| Err(KanbanError::Rejected("no permission".into())));
        let engine = engine(&store, api);

        let result = engine.move_card(intent("card1", "a", "b", 0)).await;

        assert!(matches!(result, Err(KanbanError::Rejected(_))));
        assert_eq!(store.read(BoardStore::snapshot), before);
        assert_eq!(engine.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cross_board_move_is_dense_and_confirmed() {
        let store = SharedStore::new();
        store.write(|s| {
            s.replace("a", vec![card("card1", "a", 0), card("card2", "a", 1)]);
            s.replace("b", vec![card("card3", "b", 0)]);
        });

        let mut api = MockKanbanApi::new();
        api.expect_move_card()
            .withf(|id, request| {
                id == "card1" && request.target_board_id == "b" && request.new_position == 1
            })
            .times(1)
            .returning(|id, request| {
                Ok(MoveCardResponse {
                    id: id.to_string(),
                    board_id: request.target_board_id,
                    position: request.new_position,
                    updated_at: None,
                })
            });
        let engine = engine(&store, api);

        let outcome = engine.move_card(intent("card1", "a", "b", 1)).await.unwrap();

        assert_eq!(
            outcome,
            MoveOutcome::Moved {
                board_id: "b".into(),
                index: 1
            }
        );
        store.read(|s| {
            assert_eq!(ids(s, "a"), vec!["card2"]);
            assert_eq!(ids(s, "b"), vec!["card3", "card1"]);
            assert_eq!(positions(s.cards("a")), vec![0]);
            assert_eq!(positions(s.cards("b")), vec![0, 1]);
            assert_eq!(s.card("card1").unwrap().board_id, "b");
        });
    }

    #[tokio::test]
    async fn test_same_board_move_reinserts_into_shrunk_list() {
        let store = SharedStore::new();
        store.write(|s| {
            s.replace(
                "a",
                vec![card("x", "a", 0), card("y", "a", 1), card("z", "a", 2)],
            )
        });
        let mut api = MockKanbanApi::new();
        api.expect_move_card()
            .withf(|_, request| request.target_board_id == "a" && request.new_position == 2)
            .returning(|id, request| {
                Ok(MoveCardResponse {
                    id: id.to_string(),
                    board_id: request.target_board_id,
                    position: request.new_position,
                    updated_at: None,
                })
            });
        let engine = engine(&store, api);

        engine.move_card(intent("x", "a", "a", 10)).await.unwrap();

        store.read(|s| {
            assert_eq!(ids(s, "a"), vec!["y", "z", "x"]);
            assert!(s.is_dense());
        });
    }

    #[tokio::test]
    async fn test_move_from_wrong_board_makes_no_call() {
        let store = seeded_store();
        let before = store.read(BoardStore::snapshot);
        let mut api = MockKanbanApi::new();
        api.expect_move_card().never();
        let engine = engine(&store, api);

        let outcome = engine.move_card(intent("card1", "b", "a", 0)).await.unwrap();
        assert_eq!(outcome, MoveOutcome::Skipped);
        let outcome = engine.move_card(intent("ghost", "a", "b", 0)).await.unwrap();
        assert_eq!(outcome, MoveOutcome::Skipped);

        assert_eq!(store.read(BoardStore::snapshot), before);
    }

    #[tokio::test]
    async fn test_unknown_card_update_and_delete_are_noops() {
        let store = seeded_store();
        let before = store.read(BoardStore::snapshot);
        let mut api = MockKanbanApi::new();
        api.expect_update_card().never();
        api.expect_delete_card().never();
        let engine = engine(&store, api);

        assert_eq!(
            engine
                .update_card("ghost", CardPatch::title("boo"))
                .await
                .unwrap(),
            None
        );
        assert!(!engine.delete_card("ghost").await.unwrap());
        assert_eq!(store.read(BoardStore::snapshot), before);
    }

    #[tokio::test]
    async fn test_update_merges_server_fields() {
        let store = seeded_store();
        let mut api = MockKanbanApi::new();
        api.expect_update_card().times(1).returning(|id, patch| {
            let mut server = Card::new(id, "a", patch.title.unwrap_or_default(), 0);
            server.title = server.title.trim().to_string();
            server.completed = true;
            Ok(server)
        });
        let engine = engine(&store, api);

        let card = engine
            .update_card("card2", CardPatch::title("  Renamed  "))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(card.title, "Renamed");
        assert!(card.completed);
        assert_eq!(card.position, 1);
    }

    #[tokio::test]
    async fn test_rejected_update_restores_title() {
        let store = seeded_store();
        let mut api = MockKanbanApi::new();
        api.expect_update_card()
            .returning(|_, _| Err(KanbanError::Validation("title too long".into())));
        let engine = engine(&store, api);

        let result = engine.update_card("card1", CardPatch::title("x".repeat(500))).await;

        assert!(result.is_err());
        store.read(|s| assert_eq!(s.card("card1").unwrap().title, "Card card1"));
    }

    #[tokio::test]
    async fn test_rejected_delete_restores_card_at_its_index() {
        let store = seeded_store();
        let mut api = MockKanbanApi::new();
        api.expect_delete_card()
            .returning(|_| Err(KanbanError::remote("deleteCard", "timeout")));
        let engine = engine(&store, api);

        assert!(engine.delete_card("card1").await.is_err());
        store.read(|s| assert_eq!(ids(s, "a"), vec!["card1", "card2"]));
    }

    #[tokio::test]
    async fn test_create_swaps_temporary_for_server_card() {
        let store = seeded_store();
        let mut api = MockKanbanApi::new();
        api.expect_create_card()
            .withf(|payload| payload.position == 2 && payload.board_id == "a")
            .returning(|payload| {
                Ok(Card::new("card-9", payload.board_id, payload.title, payload.position))
            });
        let engine = engine(&store, api);

        let card = engine.create_card(NewCard::new("a", "Fresh")).await.unwrap();

        assert_eq!(card.id, "card-9");
        store.read(|s| {
            assert_eq!(ids(s, "a"), vec!["card1", "card2", "card-9"]);
            assert!(s.cards("a").iter().all(|c| !c.is_temporary()));
        });
    }

    #[tokio::test]
    async fn test_failed_create_leaves_no_trace() {
        let store = seeded_store();
        let before = store.read(BoardStore::snapshot);
        let mut api = MockKanbanApi::new();
        api.expect_create_card()
            .returning(|_| Err(KanbanError::Validation("empty title".into())));
        let engine = engine(&store, api);

        assert!(engine.create_card(NewCard::new("a", "")).await.is_err());
        let after = store.read(BoardStore::snapshot);
        assert_eq!(after.cards, before.cards);
    }

    #[tokio::test]
    async fn test_rejected_board_delete_brings_cards_back() {
        let store = seeded_store();
        store.write(|s| {
            s.replace_boards(vec![Board::new("a", "env", "A", 0), Board::new("b", "env", "B", 1)])
        });
        let before = store.read(BoardStore::snapshot);
        let mut api = MockKanbanApi::new();
        api.expect_delete_board()
            .returning(|_| Err(KanbanError::Rejected("owner only".into())));
        let engine = engine(&store, api);

        assert!(engine.delete_board("a").await.is_err());
        assert_eq!(store.read(BoardStore::snapshot), before);
    }

    #[tokio::test]
    async fn test_created_board_is_loaded_and_empty() {
        let store = seeded_store();
        let mut api = MockKanbanApi::new();
        api.expect_create_board().returning(|payload| {
            Ok(Board::new("board-7", payload.environment_id, payload.name, payload.position))
        });
        let engine = engine(&store, api);

        let board = engine.create_board(NewBoard::new("env", "Review")).await.unwrap();

        store.read(|s| {
            assert_eq!(s.boards().last().unwrap().id, board.id);
            assert!(s.is_loaded("board-7"));
            assert!(s.cards("board-7").is_empty());
        });
    }

    #[test]
    fn test_ledger_latest_rejection_restores() {
        let mut ledger = InFlightLedger::default();
        let subject = Subject::Card("c".into());
        let op = ledger.begin(subject.clone(), BoardsSnapshot::default());
        assert_eq!(
            ledger.reject(&subject, op, Some("env")),
            Rollback::Restore(BoardsSnapshot::default())
        );
        assert_eq!(ledger.pending_count(), 0);
        assert_eq!(ledger.take_resync(), None);
    }

    #[test]
    fn test_ledger_superseded_rejection_hands_down_baseline() {
        let mut ledger = InFlightLedger::default();
        let subject = Subject::Card("c".into());
        let mut first_baseline = BoardsSnapshot::default();
        first_baseline.cards.insert("a".into(), vec![card("c", "a", 0)]);

        let first = ledger.begin(subject.clone(), first_baseline.clone());
        let second = ledger.begin(subject.clone(), BoardsSnapshot::default());

        assert_eq!(ledger.reject(&subject, first, None), Rollback::Superseded);
        assert_eq!(
            ledger.reject(&subject, second, None),
            Rollback::Restore(first_baseline)
        );
    }

    #[test]
    fn test_ledger_rejection_after_newer_success_does_not_restore() {
        let mut ledger = InFlightLedger::default();
        let subject = Subject::Card("c".into());
        let first = ledger.begin(subject.clone(), BoardsSnapshot::default());
        let second = ledger.begin(subject.clone(), BoardsSnapshot::default());

        assert!(ledger.confirm(&subject, second));
        assert_eq!(ledger.reject(&subject, first, None), Rollback::Superseded);
    }

    #[test]
    fn test_ledger_newer_rejection_reinstates_older_as_latest() {
        let mut ledger = InFlightLedger::default();
        let subject = Subject::Card("c".into());
        let first = ledger.begin(subject.clone(), BoardsSnapshot::default());
        let second = ledger.begin(subject.clone(), BoardsSnapshot::default());

        assert!(matches!(
            ledger.reject(&subject, second, None),
            Rollback::Restore(_)
        ));
        assert!(matches!(
            ledger.reject(&subject, first, None),
            Rollback::Restore(_)
        ));
    }

    #[test]
    fn test_ledger_subjects_are_independent() {
        let mut ledger = InFlightLedger::default();
        let card = Subject::Card("x".into());
        let board = Subject::Board("x".into());
        let a = ledger.begin(card.clone(), BoardsSnapshot::default());
        let b = ledger.begin(board.clone(), BoardsSnapshot::default());
        assert!(ledger.confirm(&card, a));
        assert!(ledger.confirm(&board, b));
    }

    #[test]
    fn test_ledger_overlapping_subjects_resync_after_drain() {
        let mut ledger = InFlightLedger::default();
        let x = Subject::Card("x".into());
        let y = Subject::Card("y".into());
        let first = ledger.begin(x.clone(), BoardsSnapshot::default());
        let second = ledger.begin(y.clone(), BoardsSnapshot::default());

        assert_eq!(ledger.reject(&x, first, Some("env")), Rollback::Resync);
        assert_eq!(ledger.take_resync(), None);

        assert!(ledger.confirm(&y, second));
        assert_eq!(
            ledger.take_resync(),
            Some(Resync {
                environment_id: Some("env".into())
            })
        );
        assert_eq!(ledger.take_resync(), None);
    }

    #[test]
    fn test_ledger_pending_resync_blocks_later_restores() {
        let mut ledger = InFlightLedger::default();
        let x = Subject::Card("x".into());
        let y = Subject::Card("y".into());
        let first = ledger.begin(x.clone(), BoardsSnapshot::default());
        let second = ledger.begin(y.clone(), BoardsSnapshot::default());
        assert_eq!(ledger.reject(&x, first, None), Rollback::Resync);

        // Only `y` is in flight now, so this op overlaps no other subject.
        let third = ledger.begin(y.clone(), BoardsSnapshot::default());
        assert_eq!(ledger.reject(&y, third, None), Rollback::Resync);

        assert!(ledger.confirm(&y, second));
        assert!(ledger.take_resync().is_some());
    }

    #[test]
    fn test_ledger_sequential_subjects_stay_independent() {
        let mut ledger = InFlightLedger::default();
        let x = Subject::Card("x".into());
        let y = Subject::Card("y".into());
        let first = ledger.begin(x.clone(), BoardsSnapshot::default());
        assert!(ledger.confirm(&x, first));

        let second = ledger.begin(y.clone(), BoardsSnapshot::default());
        assert!(matches!(
            ledger.reject(&y, second, None),
            Rollback::Restore(_)
        ));
    }
}
