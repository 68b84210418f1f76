//! Outbox reconciliation: drain locally queued messages into the live
//! connection once the peer's key is known.
//!
//! Each store snapshot is a fresh, independent pass over the pending set.
//! The in-flight guard keeps overlapping snapshots from double-sending a
//! message whose `mark_sent` has not committed yet; a failed send clears
//! the guard so the message is retried on a later pass.

use std::collections::HashSet;
use std::sync::Arc;

use pairlink_core::envelope::{self, Envelope};
use pairlink_core::{seal, PlainMessage, StoredMessage};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::session::SessionShared;

pub(crate) async fn run(shared: Arc<SessionShared>, mut shutdown: watch::Receiver<bool>) {
    let mut snapshots = shared.deps.store.subscribe();
    let mut in_flight: HashSet<Uuid> = HashSet::new();
    loop {
        let pending: Vec<StoredMessage> = snapshots
            .borrow_and_update()
            .iter()
            .filter(|m| m.self_authored && !m.sent)
            .cloned()
            .collect();
        for message in pending {
            if !in_flight.insert(message.id) {
                continue;
            }
            if !send_one(&shared, &message).await {
                in_flight.remove(&message.id);
                continue;
            }
            debug!(id = %message.id, "delivered queued message");
            if let Err(e) = shared.deps.store.mark_sent(message.id).await {
                warn!(id = %message.id, "failed to mark message sent: {e}");
            }
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

async fn send_one(shared: &SessionShared, message: &StoredMessage) -> bool {
    let Some(peer) = shared.deps.secrets.peer_identity() else {
        // Send-legal only once the peer's key is stored.
        return false;
    };
    // `self` is rewritten to false: ownership is evaluated from the
    // receiver's perspective.
    let plain = PlainMessage {
        from: message.from.clone(),
        body: message.body.clone(),
        date: message.date,
        is_self: false,
    };
    let plaintext = match plain.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(id = %message.id, "failed to encode message payload: {e}");
            return false;
        }
    };
    let sealed = match seal(&plaintext, &peer) {
        Ok(sealed) => sealed,
        Err(e) => {
            warn!(id = %message.id, "failed to seal message: {e}");
            return false;
        }
    };
    // The signature covers the plaintext, not the ciphertext.
    let signature = shared.deps.keys.sign(&plaintext);
    let envelope = Envelope::Message {
        ciphertext: envelope::to_b64(&sealed),
        signature: envelope::to_b64(&signature),
    };
    shared.send_envelope(&envelope).await
}
