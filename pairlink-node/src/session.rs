//! One live connection: the role-parameterized handshake and messaging
//! state machine.
//!
//! Both roles run the identical post-connect protocol and announce their key
//! immediately, so the handshake is symmetric-initiated rather than
//! request/response. The one asymmetry kept from the wire contract: the
//! acceptor answers the inbound key exchange (and any unrecognized envelope)
//! with `ConnectionAccepted`; the initiator waits to receive it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pairlink_core::envelope::{self, Envelope};
use pairlink_core::{PlainMessage, PublicIdentity, StoredMessage};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::LinkEvent;
use crate::framing::{FrameIoError, FrameReader, FrameWriter};
use crate::outbox;
use crate::store::{MessageStore, SecretStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Acceptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    KeyExchangePending,
    Ready,
    Closed,
}

/// What to do with a message whose signature does not verify. The legacy
/// protocol delivered it anyway; rejecting is the default here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignaturePolicy {
    #[default]
    Reject,
    AcceptAndLog,
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Maximum wait for a single inbound frame. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
    pub signature_policy: SignaturePolicy,
}

/// Everything a session needs from the outside world.
#[derive(Clone)]
pub struct SessionDeps {
    pub keys: Arc<pairlink_core::DeviceKeys>,
    pub store: Arc<dyn MessageStore>,
    pub secrets: Arc<dyn SecretStore>,
    pub events: broadcast::Sender<LinkEvent>,
    pub config: SessionConfig,
}

/// A running session. Owns the socket; dropped or shut down, the read loop
/// exits and the socket closes.
pub struct Session {
    shared: Arc<SessionShared>,
    read_task: Option<JoinHandle<()>>,
}

impl Session {
    /// Take ownership of a connected socket and start the protocol: spawn
    /// the read loop and announce the local key.
    pub fn spawn(stream: TcpStream, role: Role, deps: SessionDeps) -> Session {
        let (read_half, write_half) = stream.into_split();
        let (state, _) = watch::channel(SessionState::Connected);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(SessionShared {
            role,
            deps,
            writer: Mutex::new(FrameWriter::new(write_half)),
            state,
            shutdown,
            outbox_started: AtomicBool::new(false),
        });
        let _ = shared.deps.events.send(LinkEvent::Connected);
        let read_task = tokio::spawn(read_loop(
            shared.clone(),
            FrameReader::new(read_half),
            shutdown_rx,
        ));
        Session {
            shared,
            read_task: Some(read_task),
        }
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Signal the read loop (and the outbox task) to stop.
    pub fn shutdown(&self) {
        let _ = self.shared.shutdown.send(true);
    }

    /// Wait for the read loop to finish. Returns immediately once it has.
    pub async fn wait(&mut self) {
        if let Some(task) = self.read_task.as_mut() {
            let _ = task.await;
            self.read_task = None;
        }
    }

    /// Shut down and wait.
    pub async fn stop(mut self) {
        self.shutdown();
        self.wait().await;
    }
}

pub(crate) struct SessionShared {
    pub(crate) role: Role,
    pub(crate) deps: SessionDeps,
    writer: Mutex<FrameWriter<OwnedWriteHalf>>,
    state: watch::Sender<SessionState>,
    shutdown: watch::Sender<bool>,
    outbox_started: AtomicBool,
}

impl SessionShared {
    /// Serialize one envelope onto the socket. Writes are funneled through
    /// one writer lock; a half-written frame would corrupt the peer's
    /// framing. A write failure is reported but does not stop the read side.
    pub(crate) async fn send_envelope(&self, envelope: &Envelope) -> bool {
        let bytes = match envelope.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to encode envelope: {e}");
                return false;
            }
        };
        let mut writer = self.writer.lock().await;
        match writer.write_frame(&bytes).await {
            Ok(()) => true,
            Err(e) => {
                let _ = self
                    .deps
                    .events
                    .send(LinkEvent::ConnectionError(e.to_string()));
                false
            }
        }
    }

    fn set_state(&self, next: SessionState) {
        self.state.send_if_modified(|current| {
            // Closed is terminal.
            if *current == SessionState::Closed || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    async fn announce_local_key(&self) {
        let key = envelope::to_b64(&self.deps.keys.public().to_bytes());
        let _ = self.deps.events.send(LinkEvent::KeySharingStarted);
        self.send_envelope(&Envelope::PublicKeyAnnounce { key }).await;
    }

    async fn handle_envelope(self: &Arc<Self>, envelope: Envelope) {
        match envelope {
            Envelope::PublicKeyAnnounce { key } => self.on_peer_key(&key).await,
            Envelope::PublicKeyAck { received } => {
                let _ = self.deps.events.send(if received {
                    LinkEvent::KeyShared
                } else {
                    LinkEvent::KeyShareFailed
                });
            }
            Envelope::Message {
                ciphertext,
                signature,
            } => self.on_message(&ciphertext, &signature).await,
            Envelope::ConnectionAccepted => {
                if self.role == Role::Initiator {
                    self.set_state(SessionState::Ready);
                }
                let _ = self.deps.events.send(LinkEvent::ConnectionAccepted);
            }
            Envelope::Unknown => {
                if self.role == Role::Acceptor {
                    self.send_envelope(&Envelope::ConnectionAccepted).await;
                }
            }
        }
    }

    async fn on_peer_key(self: &Arc<Self>, key: &str) {
        let identity = envelope::from_b64(key)
            .ok()
            .and_then(|bytes| PublicIdentity::from_bytes(&bytes).ok());
        let Some(identity) = identity else {
            warn!("ignoring malformed peer identity announcement");
            self.send_envelope(&Envelope::PublicKeyAck { received: false })
                .await;
            return;
        };
        self.deps.secrets.put_peer_identity(identity);
        debug!("stored peer identity");
        self.start_outbox();
        self.send_envelope(&Envelope::PublicKeyAck { received: true })
            .await;
        if self.role == Role::Acceptor
            && self.send_envelope(&Envelope::ConnectionAccepted).await
        {
            self.set_state(SessionState::Ready);
            let _ = self.deps.events.send(LinkEvent::ConnectionAccepted);
        }
    }

    async fn on_message(&self, ciphertext: &str, signature: &str) {
        let sealed = match envelope::from_b64(ciphertext) {
            Ok(sealed) => sealed,
            Err(e) => {
                warn!("dropping message with malformed ciphertext field: {e}");
                return;
            }
        };
        let plaintext = match self.deps.keys.open(&sealed) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!("dropping undecryptable message: {e}");
                return;
            }
        };
        let signature = envelope::from_b64(signature).unwrap_or_default();
        let valid = self
            .deps
            .secrets
            .peer_identity()
            .map(|peer| pairlink_core::verify(&plaintext, &signature, &peer))
            .unwrap_or(false);
        if !valid {
            match self.deps.config.signature_policy {
                SignaturePolicy::Reject => {
                    warn!("rejecting message with invalid signature");
                    let _ = self.deps.events.send(LinkEvent::MessageTampered);
                    return;
                }
                SignaturePolicy::AcceptAndLog => {
                    warn!("accepting message with invalid signature");
                }
            }
        }
        let plain = PlainMessage::from_bytes(&plaintext, Utc::now().timestamp_millis());
        if let Err(e) = self.deps.store.create(StoredMessage::received(plain)).await {
            warn!("failed to store received message: {e}");
        }
    }

    fn start_outbox(self: &Arc<Self>) {
        if self.outbox_started.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(outbox::run(self.clone(), self.shutdown.subscribe()));
    }
}

async fn read_loop(
    shared: Arc<SessionShared>,
    mut reader: FrameReader<OwnedReadHalf>,
    mut shutdown: watch::Receiver<bool>,
) {
    shared.set_state(SessionState::KeyExchangePending);
    shared.announce_local_key().await;

    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            result = read_with_timeout(&mut reader, shared.deps.config.read_timeout) => {
                match result {
                    Ok(frame) => frame,
                    Err(e) => {
                        let _ = shared
                            .deps
                            .events
                            .send(LinkEvent::ConnectionError(e.to_string()));
                        break;
                    }
                }
            }
        };
        // A malformed envelope on a length-correct stream is protocol
        // confusion, not stream corruption: drop the frame, keep reading.
        match Envelope::decode(&frame) {
            Ok(envelope) => shared.handle_envelope(envelope).await,
            Err(e) => warn!("dropping malformed envelope: {e}"),
        }
    }

    shared.set_state(SessionState::Closed);
    // Take the outbox task down with the reader.
    let _ = shared.shutdown.send(true);
}

async fn read_with_timeout(
    reader: &mut FrameReader<OwnedReadHalf>,
    limit: Option<Duration>,
) -> Result<Vec<u8>, FrameIoError> {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, reader.read_frame()).await {
            Ok(result) => result,
            Err(_) => Err(FrameIoError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "frame read timed out",
            ))),
        },
        None => reader.read_frame().await,
    }
}
