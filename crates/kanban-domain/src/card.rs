use chrono::{DateTime, Utc};
use kanban_core::Positioned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{board::BoardId, field_update::FieldUpdate, label::Label};

pub type CardId = String;
pub type UserId = String;

/// Prefix of ids handed out to cards the server has not confirmed yet.
pub const TEMPORARY_ID_PREFIX: &str = "tmp-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardMember {
    pub user_id: UserId,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub board_id: BoardId,
    pub position: i32,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub members: Vec<CardMember>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    pub fn new(
        id: impl Into<CardId>,
        board_id: impl Into<BoardId>,
        title: impl Into<String>,
        position: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            board_id: board_id.into(),
            position,
            title: title.into(),
            description: None,
            due_date: None,
            completed: false,
            labels: Vec::new(),
            members: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A locally created card awaiting server confirmation.
    pub fn temporary(board_id: impl Into<BoardId>, title: impl Into<String>, position: i32) -> Self {
        let id = format!("{}{}", TEMPORARY_ID_PREFIX, Uuid::new_v4());
        Self::new(id, board_id, title, position)
    }

    pub fn is_temporary(&self) -> bool {
        self.id.starts_with(TEMPORARY_ID_PREFIX)
    }

    /// Shallow-merge `patch`. Location fields (`board_id`, `position`) are never
    /// touched here; they belong to the ordered collections.
    pub fn apply_patch(&mut self, patch: CardPatch) -> bool {
        let mut changed = false;
        if let Some(title) = patch.title {
            if self.title != title {
                self.title = title;
                changed = true;
            }
        }
        changed |= patch.description.apply_to(&mut self.description);
        changed |= patch.due_date.apply_to(&mut self.due_date);
        if let Some(completed) = patch.completed {
            if self.completed != completed {
                self.completed = completed;
                changed = true;
            }
        }
        if let Some(labels) = patch.labels {
            if self.labels != labels {
                self.labels = labels;
                changed = true;
            }
        }
        if let Some(members) = patch.members {
            if self.members != members {
                self.members = members;
                changed = true;
            }
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        } else if changed {
            self.updated_at = Utc::now();
        }
        changed
    }

    /// Patch carrying every content field of this card, used to merge a
    /// server-side copy without adopting its location.
    pub fn content_patch(&self) -> CardPatch {
        CardPatch {
            title: Some(self.title.clone()),
            description: self.description.clone().into(),
            due_date: self.due_date.into(),
            completed: Some(self.completed),
            labels: Some(self.labels.clone()),
            members: Some(self.members.clone()),
            updated_at: Some(self.updated_at),
        }
    }
}

impl Positioned for Card {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> i32 {
        self.position
    }

    fn set_position(&mut self, position: i32) {
        self.position = position;
    }
}

/// Partial update of a card's content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardPatch {
    pub title: Option<String>,
    pub description: FieldUpdate<String>,
    pub due_date: FieldUpdate<DateTime<Utc>>,
    pub completed: Option<bool>,
    pub labels: Option<Vec<Label>>,
    pub members: Option<Vec<CardMember>>,
    /// Server timestamp to adopt verbatim instead of stamping `now`.
    pub updated_at: Option<DateTime<Utc>>,
}

impl CardPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}
