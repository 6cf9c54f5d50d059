use chrono::{DateTime, Utc};
use kanban_core::Positioned;
use serde::{Deserialize, Serialize};

use crate::field_update::FieldUpdate;

pub type BoardId = String;
pub type EnvironmentId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: BoardId,
    pub environment_id: EnvironmentId,
    pub name: String,
    pub position: i32,
    #[serde(default)]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Board {
    pub fn new(
        id: impl Into<BoardId>,
        environment_id: impl Into<EnvironmentId>,
        name: impl Into<String>,
        position: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            environment_id: environment_id.into(),
            name: name.into(),
            position,
            color: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_patch(&mut self, patch: BoardPatch) -> bool {
        let mut changed = false;
        if let Some(name) = patch.name {
            if self.name != name {
                self.name = name;
                changed = true;
            }
        }
        changed |= patch.color.apply_to(&mut self.color);
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        } else if changed {
            self.updated_at = Utc::now();
        }
        changed
    }

    pub fn content_patch(&self) -> BoardPatch {
        BoardPatch {
            name: Some(self.name.clone()),
            color: self.color.clone().into(),
            updated_at: Some(self.updated_at),
        }
    }
}

impl Positioned for Board {
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

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardPatch {
    pub name: Option<String>,
    pub color: FieldUpdate<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BoardPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}
