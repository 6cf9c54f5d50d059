//! Controller a board view talks to.
//!
//! Wires one [`SharedStore`] to the mutation engine, the drag coordinator and
//! the realtime reconciler so every writer goes through the same store.

use crate::drag::{DragCoordinator, DragState, DropResolution, DropTarget, Point};
use crate::optimistic::{MoveOutcome, MutationEngine};
use crate::query;
use crate::realtime::{RealtimeChannel, Reconciler};
use crate::remote::KanbanApi;
use crate::store::SharedStore;
use kanban_core::{AppConfig, KanbanError, KanbanResult};
use kanban_domain::{
    Board, BoardId, BoardPatch, Card, CardPatch, EnvironmentId, NewBoard, NewCard, UserId,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

pub struct BoardSession {
    store: SharedStore,
    engine: MutationEngine,
    drag: Mutex<DragCoordinator>,
    reconciler: Reconciler,
}

impl BoardSession {
    pub fn new(
        api: Arc<dyn KanbanApi>,
        channel: Arc<dyn RealtimeChannel>,
        local_user: impl Into<UserId>,
        config: &AppConfig,
    ) -> Self {
        let store = SharedStore::new();
        Self {
            engine: MutationEngine::new(store.clone(), api),
            drag: Mutex::new(DragCoordinator::new(&config.drag)),
            reconciler: Reconciler::new(store.clone(), channel, local_user),
            store,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn engine(&self) -> &MutationEngine {
        &self.engine
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn local_user(&self) -> &str {
        self.reconciler.local_user()
    }

    // ---- environment and board lifecycle ----

    /// Switch to `environment_id`: leave any other scope, fetch its boards and
    /// join its realtime scope.
    pub async fn open_environment(&self, environment_id: &str) -> KanbanResult<Vec<Board>> {
        if let Some(joined) = self.reconciler.joined_scope().await {
            if joined != environment_id {
                self.reconciler.leave_scope(&joined).await?;
            }
        }
        let boards = self.engine.load_boards(environment_id).await?;
        self.reconciler.join_scope(environment_id).await?;
        Ok(boards)
    }

    pub async fn close_environment(&self) -> KanbanResult<()> {
        if let Some(joined) = self.reconciler.joined_scope().await {
            self.reconciler.leave_scope(&joined).await?;
        }
        Ok(())
    }

    pub async fn join_scope(&self, environment_id: &str) -> KanbanResult<()> {
        self.reconciler.join_scope(environment_id).await
    }

    pub async fn leave_scope(&self, environment_id: &str) -> KanbanResult<bool> {
        self.reconciler.leave_scope(environment_id).await
    }

    /// Fetch a board's cards; also the way to recover after repeated failures.
    pub async fn mount_board(&self, board_id: &str) -> KanbanResult<Vec<Card>> {
        self.engine.load_cards(board_id).await
    }

    pub fn unmount_board(&self, board_id: &str) -> bool {
        self.store.write(|store| store.discard_board(board_id))
    }

    // ---- drag and drop ----

    pub fn pointer_down(&self, card_id: &str, point: Point) {
        self.drag.lock().pointer_down(card_id, point);
    }

    pub fn pointer_move(&self, point: Point) -> bool {
        self.drag.lock().pointer_move(point)
    }

    pub fn start_drag(&self, card_id: &str) {
        self.drag.lock().start_drag(card_id);
    }

    pub fn hover(&self, target: Option<DropTarget>) {
        self.store
            .read(|store| self.drag.lock().hover(target, store));
    }

    /// Hover over an opaque droppable id; unknown ids clear the hover.
    pub fn hover_id(&self, id: Option<&str>) {
        self.store.read(|store| {
            let target = id.and_then(|id| DropTarget::classify(id, store));
            self.drag.lock().hover(target, store);
        });
    }

    pub fn cancel_drag(&self) {
        self.drag.lock().cancel_drag();
    }

    pub fn drag_state(&self) -> DragState {
        self.drag.lock().state().clone()
    }

    /// Drop over the last hovered target.
    pub async fn release(&self) -> KanbanResult<DropResolution> {
        let resolution = self.store.read(|store| self.drag.lock().release(store));
        self.dispatch(resolution).await
    }

    pub async fn resolve_drop(&self, target: Option<DropTarget>) -> KanbanResult<DropResolution> {
        let resolution = self
            .store
            .read(|store| self.drag.lock().resolve_drop(target, store));
        self.dispatch(resolution).await
    }

    pub async fn resolve_drop_id(&self, id: Option<&str>) -> KanbanResult<DropResolution> {
        let target = self
            .store
            .read(|store| id.and_then(|id| DropTarget::classify(id, store)));
        self.resolve_drop(target).await
    }

    async fn dispatch(&self, resolution: DropResolution) -> KanbanResult<DropResolution> {
        if let DropResolution::Move(intent) = &resolution {
            if self.engine.move_card(intent.clone()).await? == MoveOutcome::Skipped {
                return Ok(DropResolution::Aborted);
            }
        }
        Ok(resolution)
    }

    // ---- mutations ----

    pub async fn create_card(&self, board_id: &str, title: &str) -> KanbanResult<Card> {
        self.engine.create_card(NewCard::new(board_id, title)).await
    }

    pub async fn create_card_with(&self, payload: NewCard) -> KanbanResult<Card> {
        self.engine.create_card(payload).await
    }

    pub async fn update_card(&self, card_id: &str, patch: CardPatch) -> KanbanResult<Option<Card>> {
        self.engine.update_card(card_id, patch).await
    }

    pub async fn delete_card(&self, card_id: &str) -> KanbanResult<bool> {
        self.engine.delete_card(card_id).await
    }

    /// Create a board in the open environment.
    pub async fn create_board(&self, name: &str) -> KanbanResult<Board> {
        let environment_id = self.environment_id().ok_or_else(|| {
            KanbanError::Validation("no environment is open".to_string())
        })?;
        self.engine
            .create_board(NewBoard::new(environment_id, name))
            .await
    }

    pub async fn update_board(
        &self,
        board_id: &str,
        patch: BoardPatch,
    ) -> KanbanResult<Option<Board>> {
        self.engine.update_board(board_id, patch).await
    }

    pub async fn delete_board(&self, board_id: &str) -> KanbanResult<bool> {
        self.engine.delete_board(board_id).await
    }

    // ---- reads ----

    pub fn environment_id(&self) -> Option<EnvironmentId> {
        self.store
            .read(|store| store.environment_id().map(str::to_string))
    }

    pub fn boards(&self) -> Vec<Board> {
        self.store.read(|store| store.boards().to_vec())
    }

    pub fn cards(&self, board_id: &str) -> Vec<Card> {
        self.store.read(|store| query::cards_for(store, board_id))
    }

    pub fn all_cards(&self) -> Vec<Card> {
        self.store.read(query::all_cards)
    }

    pub fn find_card(&self, card_id: &str) -> Option<Card> {
        self.store.read(|store| query::find_card(store, card_id))
    }

    pub fn board_of(&self, card_id: &str) -> Option<BoardId> {
        self.store.read(|store| query::board_of(store, card_id))
    }

    pub fn board_card_counts(&self) -> Vec<(BoardId, usize)> {
        self.store.read(query::board_card_counts)
    }

    pub fn lifted_card(&self) -> Option<Card> {
        self.store
            .read(|store| query::lifted_card(store, &self.drag.lock()))
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    pub fn version(&self) -> u64 {
        self.store.read(|store| store.version())
    }
}
