//! Request and response bodies of the remote board/card operations.
//!
//! Only the fields the state engine depends on are modelled; the exact shape
//! is owned by the server API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BoardId, CardId, EnvironmentId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub title: String,
    pub board_id: BoardId,
    pub position: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NewCard {
    pub fn new(board_id: impl Into<BoardId>, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            board_id: board_id.into(),
            position: 0,
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBoard {
    pub environment_id: EnvironmentId,
    pub name: String,
    pub position: i32,
}

impl NewBoard {
    pub fn new(environment_id: impl Into<EnvironmentId>, name: impl Into<String>) -> Self {
        Self {
            environment_id: environment_id.into(),
            name: name.into(),
            position: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveCardRequest {
    pub target_board_id: BoardId,
    pub new_position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveCardResponse {
    pub id: CardId,
    pub board_id: BoardId,
    pub position: i32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
