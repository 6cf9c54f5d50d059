use thiserror::Error;

#[derive(Error, Debug)]
pub enum KanbanError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Remote {operation} failed: {message}")]
    Remote { operation: String, message: String },

    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("Realtime channel error: {0}")]
    Channel(String),

    #[error("Already joined environment {joined}, leave it before joining {requested}")]
    ScopeConflict { joined: String, requested: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl KanbanError {
    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
