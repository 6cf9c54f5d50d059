pub mod config;
pub mod error;
pub mod logging;
pub mod result;
pub mod traits;

pub use config::{AppConfig, DragConfig, LoggingConfig, RealtimeConfig};
pub use error::KanbanError;
pub use logging::init_tracing;
pub use result::KanbanResult;
pub use traits::Positioned;
