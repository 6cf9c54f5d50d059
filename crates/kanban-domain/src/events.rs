//! Push events delivered on an environment's realtime scope.

use kanban_core::{KanbanError, KanbanResult};
use serde::{Deserialize, Serialize};

use crate::{Board, BoardId, Card, CardId, EnvironmentId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum RealtimeEvent {
    CardCreated {
        card: Card,
    },
    CardUpdated {
        card: Card,
    },
    CardDeleted {
        card_id: CardId,
        board_id: BoardId,
    },
    CardMoved {
        card_id: CardId,
        from_board_id: BoardId,
        to_board_id: BoardId,
        new_index: usize,
    },
    BoardCreated {
        board: Board,
    },
    BoardUpdated {
        board: Board,
    },
    BoardDeleted {
        board_id: BoardId,
    },
}

impl RealtimeEvent {
    /// Channel name of the event, as the server emits it.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CardCreated { .. } => "cardCreated",
            Self::CardUpdated { .. } => "cardUpdated",
            Self::CardDeleted { .. } => "cardDeleted",
            Self::CardMoved { .. } => "cardMoved",
            Self::BoardCreated { .. } => "boardCreated",
            Self::BoardUpdated { .. } => "boardUpdated",
            Self::BoardDeleted { .. } => "boardDeleted",
        }
    }
}

/// An event plus the scope it was published to and the user who caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeMessage {
    pub environment_id: EnvironmentId,
    pub actor_id: UserId,
    pub event: RealtimeEvent,
}

impl RealtimeMessage {
    pub fn new(
        environment_id: impl Into<EnvironmentId>,
        actor_id: impl Into<UserId>,
        event: RealtimeEvent,
    ) -> Self {
        Self {
            environment_id: environment_id.into(),
            actor_id: actor_id.into(),
            event,
        }
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.actor_id == user_id
    }

    /// Decode a frame as delivered by the realtime server.
    pub fn from_json(raw: &str) -> KanbanResult<Self> {
        serde_json::from_str(raw).map_err(|e| KanbanError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let event = RealtimeEvent::CardDeleted {
            card_id: "c1".into(),
            board_id: "b1".into(),
        };
        assert_eq!(event.name(), "cardDeleted");
        assert_eq!(
            RealtimeEvent::BoardDeleted {
                board_id: "b1".into()
            }
            .name(),
            "boardDeleted"
        );
    }

    #[test]
    fn test_message_wire_shape() {
        let message = RealtimeMessage::new(
            "env-1",
            "bob",
            RealtimeEvent::CardMoved {
                card_id: "c1".into(),
                from_board_id: "a".into(),
                to_board_id: "b".into(),
                new_index: 2,
            },
        );
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["actorId"], "bob");
        assert_eq!(json["event"]["event"], "cardMoved");
        assert_eq!(json["event"]["payload"]["fromBoardId"], "a");
        assert_eq!(json["event"]["payload"]["newIndex"], 2);
    }

    #[test]
    fn test_parse_server_message() {
        let raw = r#"{
            "environmentId": "env-1",
            "actorId": "carol",
            "event": {"event": "cardDeleted", "payload": {"cardId": "c7", "boardId": "b3"}}
        }"#;
        let message = RealtimeMessage::from_json(raw).unwrap();
        assert!(message.is_from("carol"));
        assert_eq!(
            message.event,
            RealtimeEvent::CardDeleted {
                card_id: "c7".into(),
                board_id: "b3".into()
            }
        );
    }

    #[test]
    fn test_unknown_event_is_serialization_error() {
        let raw = r#"{"environmentId":"e","actorId":"a","event":{"event":"cardExploded","payload":{}}}"#;
        let err = RealtimeMessage::from_json(raw).unwrap_err();
        assert!(matches!(err, KanbanError::Serialization(_)));
    }
}
