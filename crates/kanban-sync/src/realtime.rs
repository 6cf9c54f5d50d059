//! Push-based reconciliation of other users' changes.
//!
//! A [`Reconciler`] joins one environment scope at a time and applies every
//! message to the shared store on a background pump task. Application is
//! idempotent by id: duplicates, echoes, and stale or out-of-order events
//! degrade to no-ops.

use crate::store::{BoardStore, SharedStore};
use async_trait::async_trait;
use kanban_core::{KanbanError, KanbanResult, RealtimeConfig};
use kanban_domain::{EnvironmentId, RealtimeEvent, RealtimeMessage, UserId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Subscription boundary to the server's push channel.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn join(&self, environment_id: &str)
        -> KanbanResult<broadcast::Receiver<RealtimeMessage>>;

    async fn leave(&self, environment_id: &str) -> KanbanResult<()>;
}

struct Scope {
    sender: broadcast::Sender<RealtimeMessage>,
    members: usize,
}

/// In-process channel with one broadcast per environment.
pub struct LocalChannel {
    capacity: usize,
    scopes: Mutex<HashMap<EnvironmentId, Scope>>,
}

impl LocalChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            scopes: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(config.channel_capacity)
    }

    /// Deliver to everyone joined to the message's environment. Returns the
    /// number of receivers reached.
    pub fn publish(&self, message: RealtimeMessage) -> usize {
        let scopes = self.scopes.lock();
        match scopes.get(&message.environment_id) {
            Some(scope) => scope.sender.send(message).unwrap_or(0),
            None => 0,
        }
    }

    pub fn members(&self, environment_id: &str) -> usize {
        self.scopes
            .lock()
            .get(environment_id)
            .map_or(0, |scope| scope.members)
    }
}

impl Default for LocalChannel {
    fn default() -> Self {
        Self::from_config(&RealtimeConfig::default())
    }
}

#[async_trait]
impl RealtimeChannel for LocalChannel {
    async fn join(
        &self,
        environment_id: &str,
    ) -> KanbanResult<broadcast::Receiver<RealtimeMessage>> {
        let mut scopes = self.scopes.lock();
        let scope = scopes
            .entry(environment_id.to_string())
            .or_insert_with(|| Scope {
                sender: broadcast::channel(self.capacity).0,
                members: 0,
            });
        scope.members += 1;
        Ok(scope.sender.subscribe())
    }

    async fn leave(&self, environment_id: &str) -> KanbanResult<()> {
        let mut scopes = self.scopes.lock();
        let Some(scope) = scopes.get_mut(environment_id) else {
            return Err(KanbanError::Channel(format!(
                "not joined to environment {}",
                environment_id
            )));
        };
        scope.members = scope.members.saturating_sub(1);
        if scope.members == 0 {
            scopes.remove(environment_id);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Echo of the local user's own action.
    Suppressed,
    /// Nothing to do: unknown ids, duplicates, stale data or another environment.
    Ignored,
}

struct ActiveScope {
    environment_id: EnvironmentId,
    pump: JoinHandle<()>,
}

impl Drop for ActiveScope {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

pub struct Reconciler {
    store: SharedStore,
    channel: Arc<dyn RealtimeChannel>,
    local_user: UserId,
    scope: tokio::sync::Mutex<Option<ActiveScope>>,
}

impl Reconciler {
    pub fn new(
        store: SharedStore,
        channel: Arc<dyn RealtimeChannel>,
        local_user: impl Into<UserId>,
    ) -> Self {
        Self {
            store,
            channel,
            local_user: local_user.into(),
            scope: tokio::sync::Mutex::new(None),
        }
    }

    pub fn local_user(&self) -> &str {
        &self.local_user
    }

    /// Subscribe to an environment and start applying its events. Joining the
    /// scope already joined is a no-op; joining a second one is an error.
    pub async fn join_scope(&self, environment_id: &str) -> KanbanResult<()> {
        let mut scope = self.scope.lock().await;
        if let Some(active) = scope.as_ref() {
            if active.environment_id == environment_id {
                return Ok(());
            }
            return Err(KanbanError::ScopeConflict {
                joined: active.environment_id.clone(),
                requested: environment_id.to_string(),
            });
        }

        let receiver = self.channel.join(environment_id).await?;
        let pump = tokio::spawn(pump(
            receiver,
            self.store.clone(),
            self.local_user.clone(),
            environment_id.to_string(),
        ));
        *scope = Some(ActiveScope {
            environment_id: environment_id.to_string(),
            pump,
        });
        tracing::info!("Joined realtime scope {}", environment_id);
        Ok(())
    }

    /// Stop the pump and leave. Returns `false` when that scope was not joined.
    pub async fn leave_scope(&self, environment_id: &str) -> KanbanResult<bool> {
        let mut scope = self.scope.lock().await;
        match scope.as_ref() {
            Some(active) if active.environment_id == environment_id => {}
            _ => return Ok(false),
        }
        // Dropping the scope aborts the pump.
        scope.take();
        self.channel.leave(environment_id).await?;
        tracing::info!("Left realtime scope {}", environment_id);
        Ok(true)
    }

    pub async fn joined_scope(&self) -> Option<EnvironmentId> {
        self.scope
            .lock()
            .await
            .as_ref()
            .map(|active| active.environment_id.clone())
    }

    /// Apply one message to the store directly, bypassing the pump.
    pub fn apply(&self, message: &RealtimeMessage) -> ApplyOutcome {
        self.store
            .write(|store| reconcile(store, &self.local_user, message))
    }
}

async fn pump(
    mut receiver: broadcast::Receiver<RealtimeMessage>,
    store: SharedStore,
    local_user: UserId,
    environment_id: EnvironmentId,
) {
    loop {
        match receiver.recv().await {
            Ok(message) => {
                let outcome = store.write(|store| reconcile(store, &local_user, &message));
                tracing::debug!("{} on {}: {:?}", message.event.name(), environment_id, outcome);
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    "Realtime scope {} lagged, {} events skipped",
                    environment_id,
                    skipped
                );
            }
            Err(RecvError::Closed) => {
                tracing::debug!("Realtime scope {} closed", environment_id);
                break;
            }
        }
    }
}

/// Merge one pushed message into the store.
pub fn reconcile(store: &mut BoardStore, local_user: &str, message: &RealtimeMessage) -> ApplyOutcome {
    if message.is_from(local_user) {
        tracing::debug!("Suppressed echo of {}", message.event.name());
        return ApplyOutcome::Suppressed;
    }
    if store.environment_id() != Some(message.environment_id.as_str()) {
        return ApplyOutcome::Ignored;
    }

    let applied = match &message.event {
        RealtimeEvent::CardCreated { card } => {
            if store.card(&card.id).is_some() || !store.is_loaded(&card.board_id) {
                false
            } else {
                let index = usize::try_from(card.position).unwrap_or(0);
                store.insert(&card.board_id, card.clone(), index);
                true
            }
        }
        RealtimeEvent::CardUpdated { card } => {
            match store.card(&card.id).map(|local| local.updated_at) {
                Some(local_updated) if local_updated > card.updated_at => {
                    tracing::debug!("Stale update for card {} ignored", card.id);
                    false
                }
                Some(_) => store.patch_anywhere(&card.id, card.content_patch()),
                None => false,
            }
        }
        RealtimeEvent::CardDeleted { card_id, board_id } => {
            store.remove(board_id, card_id).is_some() || store.remove_anywhere(card_id).is_some()
        }
        RealtimeEvent::CardMoved {
            card_id,
            from_board_id,
            to_board_id,
            new_index,
        } => {
            if store.index_of(from_board_id, card_id).is_none() {
                false
            } else if store.is_loaded(to_board_id) {
                store
                    .move_card(card_id, from_board_id, to_board_id, *new_index)
                    .is_some()
            } else {
                // Destination not held locally; the card just leaves this view.
                store.remove(from_board_id, card_id).is_some()
            }
        }
        RealtimeEvent::BoardCreated { board } => {
            if store.board(&board.id).is_some() {
                false
            } else {
                let index = usize::try_from(board.position).unwrap_or(0);
                store.insert_board(board.clone(), index);
                true
            }
        }
        RealtimeEvent::BoardUpdated { board } => match store
            .board(&board.id)
            .map(|local| local.updated_at)
        {
            Some(local_updated) if local_updated > board.updated_at => false,
            Some(_) => {
                store.patch_board(&board.id, board.content_patch());
                let target = usize::try_from(board.position).unwrap_or(0);
                if store.board_index(&board.id) != Some(target) {
                    store.move_board(&board.id, target);
                }
                true
            }
            None => false,
        },
        RealtimeEvent::BoardDeleted { board_id } => {
            if store.has_board(board_id) {
                store.remove_board(board_id);
                true
            } else {
                false
            }
        }
    };

    if applied {
        ApplyOutcome::Applied
    } else {
        ApplyOutcome::Ignored
    }
}
