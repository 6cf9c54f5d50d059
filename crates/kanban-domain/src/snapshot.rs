//! Point-in-time capture of the client-side board state.
//!
//! Taken by the mutation engine before every optimistic change and restored
//! verbatim when the server rejects it.

use crate::{Board, BoardId, Card};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardsSnapshot {
    #[serde(default)]
    pub boards: Vec<Board>,

    /// Ordered cards per board, in rendered order.
    #[serde(default)]
    pub cards: HashMap<BoardId, Vec<Card>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_deserialization() {
        let snapshot: BoardsSnapshot = serde_json::from_str(r#"{"boards": []}"#).unwrap();
        assert!(snapshot.cards.is_empty());
    }
}
