//! In-process authoritative backend.
//!
//! Holds the server copy of boards and cards, renumbers positions on every
//! change, and publishes each mutation to a [`LocalChannel`] tagged with the
//! acting user. Used by the simulator and by integration tests; failures and
//! delays can be injected per operation.

use crate::realtime::LocalChannel;
use crate::remote::{KanbanApi, Operation};
use async_trait::async_trait;
use chrono::Utc;
use kanban_core::{KanbanError, KanbanResult, Positioned};
use kanban_domain::{
    Board, BoardId, BoardPatch, Card, CardPatch, EnvironmentId, MoveCardRequest,
    MoveCardResponse, NewBoard, NewCard, RealtimeEvent, RealtimeMessage, UserId,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Default)]
struct ServerState {
    boards: HashMap<EnvironmentId, Vec<Board>>,
    cards: HashMap<BoardId, Vec<Card>>,
    failures: HashMap<Operation, VecDeque<KanbanError>>,
    gates: HashMap<Operation, VecDeque<oneshot::Receiver<()>>>,
    calls: HashMap<Operation, usize>,
    next_id: u64,
}

impl ServerState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn environment_of(&self, board_id: &str) -> Option<EnvironmentId> {
        self.boards
            .iter()
            .find(|(_, boards)| boards.iter().any(|b| b.id == board_id))
            .map(|(env, _)| env.clone())
    }

    fn board_exists(&self, board_id: &str) -> bool {
        self.environment_of(board_id).is_some() || self.cards.contains_key(board_id)
    }

    fn locate_card(&self, card_id: &str) -> Option<(BoardId, usize)> {
        self.cards.iter().find_map(|(board_id, cards)| {
            cards
                .iter()
                .position(|c| c.id == card_id)
                .map(|index| (board_id.clone(), index))
        })
    }

    fn locate_board(&self, board_id: &str) -> Option<(EnvironmentId, usize)> {
        self.boards.iter().find_map(|(env, boards)| {
            boards
                .iter()
                .position(|b| b.id == board_id)
                .map(|index| (env.clone(), index))
        })
    }
}

fn renumber<T: Positioned>(items: &mut [T]) {
    for (index, item) in items.iter_mut().enumerate() {
        item.set_position(index as i32);
    }
}

fn clamp_index(position: i32, len: usize) -> usize {
    usize::try_from(position).unwrap_or(0).min(len)
}

fn require_text(field: &str, value: &str) -> KanbanResult<()> {
    if value.trim().is_empty() {
        return Err(KanbanError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[derive(Clone)]
pub struct InMemoryBackend {
    state: Arc<Mutex<ServerState>>,
    channel: Arc<LocalChannel>,
    latency: Option<Duration>,
}

impl InMemoryBackend {
    pub fn new(channel: Arc<LocalChannel>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState::default())),
            channel,
            latency: None,
        }
    }

    /// Delay every request by `latency` before it is processed.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency).filter(|d| !d.is_zero());
        self
    }

    pub fn channel(&self) -> Arc<LocalChannel> {
        self.channel.clone()
    }

    /// A client acting as `user_id`; its mutations are published under that actor.
    pub fn client(&self, user_id: impl Into<UserId>) -> InMemoryClient {
        InMemoryClient {
            backend: self.clone(),
            user_id: user_id.into(),
        }
    }

    pub fn seed_board(&self, board: Board) -> Board {
        let mut state = self.state.lock();
        state.cards.entry(board.id.clone()).or_default();
        let boards = state.boards.entry(board.environment_id.clone()).or_default();
        let index = clamp_index(board.position, boards.len());
        boards.insert(index, board);
        renumber(boards);
        boards[index].clone()
    }

    pub fn seed_card(&self, card: Card) -> Card {
        let mut state = self.state.lock();
        let cards = state.cards.entry(card.board_id.clone()).or_default();
        let index = clamp_index(card.position, cards.len());
        cards.insert(index, card);
        renumber(cards);
        cards[index].clone()
    }

    /// Make the next call of `operation` fail with `error`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, operation: Operation, error: KanbanError) {
        self.state
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    pub fn reject_next(&self, operation: Operation, message: impl Into<String>) {
        self.fail_next(operation, KanbanError::Rejected(message.into()));
    }

    /// Hold the next call of `operation` until the returned sender fires or is dropped.
    pub fn pause_next(&self, operation: Operation) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.state
            .lock()
            .gates
            .entry(operation)
            .or_default()
            .push_back(gate);
        release
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.state.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Server copy of a board's cards.
    pub fn cards(&self, board_id: &str) -> Vec<Card> {
        self.state
            .lock()
            .cards
            .get(board_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn boards(&self, environment_id: &str) -> Vec<Board> {
        self.state
            .lock()
            .boards
            .get(environment_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn admit(&self, operation: Operation) -> KanbanResult<()> {
        let gate = {
            let mut state = self.state.lock();
            *state.calls.entry(operation).or_default() += 1;
            state.gates.get_mut(&operation).and_then(VecDeque::pop_front)
        };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(gate) = gate {
            // A dropped sender releases the call as well.
            let _ = gate.await;
        }
        let failure = self
            .state
            .lock()
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(err) => {
                tracing::debug!("Injected failure for {}: {}", operation, err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn publish(&self, environment_id: Option<EnvironmentId>, actor: &str, event: RealtimeEvent) {
        if let Some(environment_id) = environment_id {
            let reached = self
                .channel
                .publish(RealtimeMessage::new(environment_id, actor, event));
            tracing::trace!("Published to {} subscribers", reached);
        }
    }
}

pub struct InMemoryClient {
    backend: InMemoryBackend,
    user_id: UserId,
}

impl InMemoryClient {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn backend(&self) -> &InMemoryBackend {
        &self.backend
    }
}

#[async_trait]
impl KanbanApi for InMemoryClient {
    async fn fetch_cards_for_board(&self, board_id: &str) -> KanbanResult<Vec<Card>> {
        self.backend.admit(Operation::FetchCards).await?;
        let state = self.backend.state.lock();
        if !state.board_exists(board_id) {
            return Err(KanbanError::NotFound(format!("board {}", board_id)));
        }
        Ok(state.cards.get(board_id).cloned().unwrap_or_default())
    }

    async fn create_card(&self, payload: NewCard) -> KanbanResult<Card> {
        self.backend.admit(Operation::CreateCard).await?;
        require_text("title", &payload.title)?;
        let (card, environment_id) = {
            let mut state = self.backend.state.lock();
            if !state.board_exists(&payload.board_id) {
                return Err(KanbanError::NotFound(format!("board {}", payload.board_id)));
            }
            let id = state.next_id("card");
            let environment_id = state.environment_of(&payload.board_id);
            let cards = state.cards.entry(payload.board_id.clone()).or_default();
            let index = clamp_index(payload.position, cards.len());
            let mut card = Card::new(id, payload.board_id, payload.title.trim(), index as i32);
            card.description = payload.description;
            cards.insert(index, card);
            renumber(cards);
            (cards[index].clone(), environment_id)
        };
        self.backend.publish(
            environment_id,
            &self.user_id,
            RealtimeEvent::CardCreated { card: card.clone() },
        );
        Ok(card)
    }

    async fn update_card(&self, id: &str, mut patch: CardPatch) -> KanbanResult<Card> {
        self.backend.admit(Operation::UpdateCard).await?;
        if let Some(title) = patch.title.as_mut() {
            require_text("title", title)?;
            *title = title.trim().to_string();
        }
        let (card, environment_id) = {
            let mut state = self.backend.state.lock();
            let Some((board_id, index)) = state.locate_card(id) else {
                return Err(KanbanError::NotFound(format!("card {}", id)));
            };
            let environment_id = state.environment_of(&board_id);
            let Some(card) = state
                .cards
                .get_mut(&board_id)
                .and_then(|cards| cards.get_mut(index))
            else {
                return Err(KanbanError::Internal(format!("card {} lost its slot", id)));
            };
            patch.updated_at = None;
            card.apply_patch(patch);
            card.updated_at = Utc::now();
            (card.clone(), environment_id)
        };
        self.backend.publish(
            environment_id,
            &self.user_id,
            RealtimeEvent::CardUpdated { card: card.clone() },
        );
        Ok(card)
    }

    async fn delete_card(&self, id: &str) -> KanbanResult<()> {
        self.backend.admit(Operation::DeleteCard).await?;
        let (board_id, environment_id) = {
            let mut state = self.backend.state.lock();
            let Some((board_id, index)) = state.locate_card(id) else {
                return Err(KanbanError::NotFound(format!("card {}", id)));
            };
            let environment_id = state.environment_of(&board_id);
            if let Some(cards) = state.cards.get_mut(&board_id) {
                cards.remove(index);
                renumber(cards);
            }
            (board_id, environment_id)
        };
        self.backend.publish(
            environment_id,
            &self.user_id,
            RealtimeEvent::CardDeleted {
                card_id: id.to_string(),
                board_id,
            },
        );
        Ok(())
    }

    async fn move_card(&self, id: &str, request: MoveCardRequest) -> KanbanResult<MoveCardResponse> {
        self.backend.admit(Operation::MoveCard).await?;
        let (response, from_board_id, environment_id) = {
            let mut state = self.backend.state.lock();
            let Some((from_board_id, from_index)) = state.locate_card(id) else {
                return Err(KanbanError::NotFound(format!("card {}", id)));
            };
            if !state.board_exists(&request.target_board_id) {
                return Err(KanbanError::NotFound(format!(
                    "board {}",
                    request.target_board_id
                )));
            }
            let environment_id = state.environment_of(&request.target_board_id);

            let Some(mut card) = state
                .cards
                .get_mut(&from_board_id)
                .map(|cards| {
                    let card = cards.remove(from_index);
                    renumber(cards);
                    card
                })
            else {
                return Err(KanbanError::Internal(format!("card {} lost its slot", id)));
            };
            card.board_id = request.target_board_id.clone();
            card.updated_at = Utc::now();

            let cards = state
                .cards
                .entry(request.target_board_id.clone())
                .or_default();
            let index = clamp_index(request.new_position, cards.len());
            cards.insert(index, card);
            renumber(cards);
            let moved = &cards[index];
            let response = MoveCardResponse {
                id: moved.id.clone(),
                board_id: moved.board_id.clone(),
                position: moved.position,
                updated_at: Some(moved.updated_at),
            };
            (response, from_board_id, environment_id)
        };
        self.backend.publish(
            environment_id,
            &self.user_id,
            RealtimeEvent::CardMoved {
                card_id: response.id.clone(),
                from_board_id,
                to_board_id: response.board_id.clone(),
                new_index: usize::try_from(response.position).unwrap_or(0),
            },
        );
        Ok(response)
    }

    async fn fetch_boards(&self, environment_id: &str) -> KanbanResult<Vec<Board>> {
        self.backend.admit(Operation::FetchBoards).await?;
        Ok(self.backend.boards(environment_id))
    }

    async fn create_board(&self, payload: NewBoard) -> KanbanResult<Board> {
        self.backend.admit(Operation::CreateBoard).await?;
        require_text("name", &payload.name)?;
        let board = {
            let mut state = self.backend.state.lock();
            let id = state.next_id("board");
            state.cards.insert(id.clone(), Vec::new());
            let boards = state
                .boards
                .entry(payload.environment_id.clone())
                .or_default();
            let index = clamp_index(payload.position, boards.len());
            boards.insert(
                index,
                Board::new(id, payload.environment_id, payload.name.trim(), index as i32),
            );
            renumber(boards);
            boards[index].clone()
        };
        self.backend.publish(
            Some(board.environment_id.clone()),
            &self.user_id,
            RealtimeEvent::BoardCreated {
                board: board.clone(),
            },
        );
        Ok(board)
    }

    async fn update_board(&self, id: &str, mut patch: BoardPatch) -> KanbanResult<Board> {
        self.backend.admit(Operation::UpdateBoard).await?;
        if let Some(name) = patch.name.as_mut() {
            require_text("name", name)?;
            *name = name.trim().to_string();
        }
        let board = {
            let mut state = self.backend.state.lock();
            let Some((environment_id, index)) = state.locate_board(id) else {
                return Err(KanbanError::NotFound(format!("board {}", id)));
            };
            let Some(board) = state
                .boards
                .get_mut(&environment_id)
                .and_then(|boards| boards.get_mut(index))
            else {
                return Err(KanbanError::Internal(format!("board {} lost its slot", id)));
            };
            patch.updated_at = None;
            board.apply_patch(patch);
            board.updated_at = Utc::now();
            board.clone()
        };
        self.backend.publish(
            Some(board.environment_id.clone()),
            &self.user_id,
            RealtimeEvent::BoardUpdated {
                board: board.clone(),
            },
        );
        Ok(board)
    }

    async fn delete_board(&self, id: &str) -> KanbanResult<()> {
        self.backend.admit(Operation::DeleteBoard).await?;
        let environment_id = {
            let mut state = self.backend.state.lock();
            let Some((environment_id, index)) = state.locate_board(id) else {
                return Err(KanbanError::NotFound(format!("board {}", id)));
            };
            if let Some(boards) = state.boards.get_mut(&environment_id) {
                boards.remove(index);
                renumber(boards);
            }
            state.cards.remove(id);
            environment_id
        };
        self.backend.publish(
            Some(environment_id),
            &self.user_id,
            RealtimeEvent::BoardDeleted {
                board_id: id.to_string(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::RealtimeChannel;

    fn backend() -> InMemoryBackend {
        let backend = InMemoryBackend::new(Arc::new(LocalChannel::new(16)));
        backend.seed_board(Board::new("a", "env", "A", 0));
        backend.seed_board(Board::new("b", "env", "B", 1));
        backend.seed_card(Card::new("c1", "a", "One", 0));
        backend.seed_card(Card::new("c2", "a", "Two", 1));
        backend
    }

    fn ids(cards: &[Card]) -> Vec<String> {
        cards.iter().map(|c| c.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_move_renumbers_both_boards() {
        let backend = backend();
        let client = backend.client("alice");
        let response = client
            .move_card(
                "c1",
                MoveCardRequest {
                    target_board_id: "b".into(),
                    new_position: 9,
                },
            )
            .await
            .unwrap();

        assert_eq!(response.board_id, "b");
        assert_eq!(response.position, 0);
        assert_eq!(ids(&backend.cards("a")), vec!["c2"]);
        assert_eq!(backend.cards("a")[0].position, 0);
        assert_eq!(ids(&backend.cards("b")), vec!["c1"]);
    }

    #[tokio::test]
    async fn test_validation_and_not_found() {
        let backend = backend();
        let client = backend.client("alice");

        let err = client.create_card(NewCard::new("a", "  ")).await.unwrap_err();
        assert!(matches!(err, KanbanError::Validation(_)));
        let err = client.create_card(NewCard::new("zzz", "x")).await.unwrap_err();
        assert!(matches!(err, KanbanError::NotFound(_)));
        let err = client.delete_card("ghost").await.unwrap_err();
        assert!(matches!(err, KanbanError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let backend = backend();
        let client = backend.client("alice");
        backend.reject_next(Operation::DeleteCard, "nope");

        assert!(matches!(
            client.delete_card("c1").await,
            Err(KanbanError::Rejected(_))
        ));
        client.delete_card("c1").await.unwrap();
        assert_eq!(backend.call_count(Operation::DeleteCard), 2);
    }

    #[tokio::test]
    async fn test_paused_call_waits_for_release() {
        let backend = backend();
        let client = backend.client("alice");
        let release = backend.pause_next(Operation::UpdateCard);

        let call = tokio::spawn(async move { client.update_card("c1", CardPatch::title("Hi")).await });
        tokio::task::yield_now().await;
        assert_eq!(backend.cards("a")[0].title, "One");

        release.send(()).unwrap();
        let card = call.await.unwrap().unwrap();
        assert_eq!(card.title, "Hi");
        assert_eq!(backend.cards("a")[0].title, "Hi");
    }

    #[tokio::test]
    async fn test_mutations_are_published_with_actor() {
        let backend = backend();
        let mut rx = backend.channel().join("env").await.unwrap();
        let client = backend.client("bob");

        let card = client.create_card(NewCard::new("b", "Fresh")).await.unwrap();

        let message = rx.recv().await.unwrap();
        assert!(message.is_from("bob"));
        assert_eq!(message.environment_id, "env");
        assert_eq!(message.event, RealtimeEvent::CardCreated { card });
    }

    #[tokio::test]
    async fn test_board_lifecycle() {
        let backend = backend();
        let client = backend.client("alice");

        let board = client.create_board(NewBoard::new("env", "Review")).await.unwrap();
        assert_eq!(board.position, 0);
        assert_eq!(
            ids_of_boards(&client.fetch_boards("env").await.unwrap()),
            vec![board.id.clone(), "a".into(), "b".into()]
        );

        client.delete_board("a").await.unwrap();
        assert!(backend.cards("a").is_empty());
        assert!(matches!(
            client.fetch_cards_for_board("a").await,
            Err(KanbanError::NotFound(_))
        ));
    }

    fn ids_of_boards(boards: &[Board]) -> Vec<String> {
        boards.iter().map(|b| b.id.clone()).collect()
    }
}
