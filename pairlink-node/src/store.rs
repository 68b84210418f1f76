//! Message and secret storage: traits plus in-memory implementations.
//!
//! `MessageStore::subscribe` is a snapshot stream, not a one-shot read: the
//! receiver suspends until a snapshot is available, consumes it, and
//! re-suspends for the next one, for as long as the subscriber lives.

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::Utc;
use pairlink_core::{PublicIdentity, StoredMessage};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("message not found: {0}")]
    NotFound(Uuid),
    #[error("empty message body")]
    EmptyBody,
}

/// The durable message collection shared by the send path, the receive path,
/// and the outbox reconciler. Records are only appended or flipped to
/// `sent`; nothing here edits `from`/`body`/`date` in place.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create(&self, message: StoredMessage) -> Result<(), StoreError>;
    /// Flip `sent` to true. Transitions once and never reverts.
    async fn mark_sent(&self, id: Uuid) -> Result<(), StoreError>;
    /// Subscribe to full-collection snapshots.
    fn subscribe(&self) -> watch::Receiver<Vec<StoredMessage>>;
}

/// Key-value storage for the peer's public identity. Overwritten on each
/// successful key exchange.
pub trait SecretStore: Send + Sync {
    fn peer_identity(&self) -> Option<PublicIdentity>;
    fn put_peer_identity(&self, identity: PublicIdentity);
}

/// In-memory message store.
pub struct MemoryMessageStore {
    messages: Mutex<Vec<StoredMessage>>,
    snapshot: watch::Sender<Vec<StoredMessage>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Vec::new());
        Self {
            messages: Mutex::new(Vec::new()),
            snapshot,
        }
    }

    /// Current contents, in insertion order.
    pub async fn messages(&self) -> Vec<StoredMessage> {
        self.messages.lock().await.clone()
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn create(&self, message: StoredMessage) -> Result<(), StoreError> {
        let mut messages = self.messages.lock().await;
        messages.push(message);
        self.snapshot.send_replace(messages.clone());
        Ok(())
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), StoreError> {
        let mut messages = self.messages.lock().await;
        let record = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StoreError::NotFound(id))?;
        record.sent = true;
        self.snapshot.send_replace(messages.clone());
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Vec<StoredMessage>> {
        self.snapshot.subscribe()
    }
}

/// In-memory secret store.
pub struct MemorySecretStore {
    peer: StdMutex<Option<PublicIdentity>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self {
            peer: StdMutex::new(None),
        }
    }
}

impl Default for MemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for MemorySecretStore {
    fn peer_identity(&self) -> Option<PublicIdentity> {
        self.peer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn put_peer_identity(&self, identity: PublicIdentity) {
        *self
            .peer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(identity);
    }
}

/// The send path: queue a locally composed message for the outbox. Blank
/// bodies are rejected; delivery is the reconciler's job.
pub async fn queue_outgoing(
    store: &dyn MessageStore,
    from: &str,
    body: &str,
) -> Result<Uuid, StoreError> {
    if body.trim().is_empty() {
        return Err(StoreError::EmptyBody);
    }
    let message = StoredMessage::outgoing(from, body, Utc::now().timestamp_millis());
    let id = message.id;
    store.create(message).await?;
    Ok(id)
}
