use async_trait::async_trait;
use kanban_core::KanbanResult;
use kanban_domain::{
    Board, BoardPatch, Card, CardPatch, MoveCardRequest, MoveCardResponse, NewBoard, NewCard,
};
use std::fmt;

/// Remote operations consumed by the engine. Request and response shapes are
/// owned by the server; only the fields the engine reads are modelled.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KanbanApi: Send + Sync {
    async fn fetch_cards_for_board(&self, board_id: &str) -> KanbanResult<Vec<Card>>;

    async fn create_card(&self, payload: NewCard) -> KanbanResult<Card>;

    async fn update_card(&self, id: &str, patch: CardPatch) -> KanbanResult<Card>;

    async fn delete_card(&self, id: &str) -> KanbanResult<()>;

    async fn move_card(&self, id: &str, request: MoveCardRequest)
        -> KanbanResult<MoveCardResponse>;

    async fn fetch_boards(&self, environment_id: &str) -> KanbanResult<Vec<Board>>;

    async fn create_board(&self, payload: NewBoard) -> KanbanResult<Board>;

    async fn update_board(&self, id: &str, patch: BoardPatch) -> KanbanResult<Board>;

    async fn delete_board(&self, id: &str) -> KanbanResult<()>;
}

/// Names of the remote operations, as used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchCards,
    CreateCard,
    UpdateCard,
    DeleteCard,
    MoveCard,
    FetchBoards,
    CreateBoard,
    UpdateBoard,
    DeleteBoard,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchCards => "fetchCardsForBoard",
            Self::CreateCard => "createCard",
            Self::UpdateCard => "updateCard",
            Self::DeleteCard => "deleteCard",
            Self::MoveCard => "moveCard",
            Self::FetchBoards => "fetchBoards",
            Self::CreateBoard => "createBoard",
            Self::UpdateBoard => "updateBoard",
            Self::DeleteBoard => "deleteBoard",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
