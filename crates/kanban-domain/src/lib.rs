pub mod board;
pub mod card;
pub mod events;
pub mod field_update;
pub mod label;
pub mod move_intent;
pub mod requests;
pub mod snapshot;

pub use board::{Board, BoardId, BoardPatch, EnvironmentId};
pub use card::{Card, CardId, CardMember, CardPatch, UserId, TEMPORARY_ID_PREFIX};
pub use events::{RealtimeEvent, RealtimeMessage};
pub use field_update::FieldUpdate;
pub use label::{Label, LabelId};
pub use move_intent::MoveIntent;
pub use requests::{MoveCardRequest, MoveCardResponse, NewBoard, NewCard};
pub use snapshot::BoardsSnapshot;
