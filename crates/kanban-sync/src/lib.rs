//! Client-side state engine behind the drag-and-drop kanban view.
//!
//! Every writer (drag coordinator, mutation engine, realtime layer) goes
//! through the id-keyed primitives of [`BoardStore`], which keep card and
//! board positions dense after each structural change.

pub mod collection;
pub mod drag;
pub mod memory;
pub mod optimistic;
pub mod query;
pub mod realtime;
pub mod remote;
pub mod session;
pub mod store;

pub use collection::OrderedList;
pub use drag::{DragCoordinator, DragState, DropResolution, DropTarget, Point};
pub use memory::{InMemoryBackend, InMemoryClient};
pub use optimistic::{MoveOutcome, MutationEngine, OperationId};
pub use realtime::{ApplyOutcome, LocalChannel, RealtimeChannel, Reconciler};
pub use remote::{KanbanApi, Operation};
pub use session::BoardSession;
pub use store::{BoardStore, SharedStore};
