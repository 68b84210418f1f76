//! Acceptor and initiator supervisors: turn locator events into live
//! sessions.
//!
//! Discovery is an external collaborator; it hands addresses over a channel.
//! A new address replaces the old one: the current listener/session is torn
//! down and the supervisor starts over. Transport failures are surfaced as
//! events and never retried here; the next locator event decides.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::events::LinkEvent;
use crate::session::{Role, Session, SessionDeps};

/// A resolved peer location. The acceptor uses only the port (bind side);
/// the initiator dials host:port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

/// Listen for the peer. One live session at a time; when it ends, the
/// listener accepts the next connection. Runs until the locator closes.
pub async fn run_acceptor(mut locator: mpsc::Receiver<PeerAddress>, deps: SessionDeps) {
    let mut next = locator.recv().await;
    while let Some(addr) = next {
        match TcpListener::bind(("0.0.0.0", addr.port)).await {
            Ok(listener) => {
                info!(port = addr.port, "listening for peer");
                next = serve(listener, &deps, &mut locator).await;
            }
            Err(e) => {
                warn!(port = addr.port, "bind failed: {e}");
                let _ = deps.events.send(LinkEvent::ConnectionError(e.to_string()));
                next = locator.recv().await;
            }
        }
    }
}

/// Accept clients on one listener until a new address arrives (returned) or
/// the locator closes (`None`).
async fn serve(
    listener: TcpListener,
    deps: &SessionDeps,
    locator: &mut mpsc::Receiver<PeerAddress>,
) -> Option<PeerAddress> {
    loop {
        let (stream, remote) = tokio::select! {
            maybe_addr = locator.recv() => return maybe_addr,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    let _ = deps.events.send(LinkEvent::ConnectionError(e.to_string()));
                    return locator.recv().await;
                }
            },
        };
        info!(%remote, "peer connected");
        let mut session = Session::spawn(stream, Role::Acceptor, deps.clone());
        tokio::select! {
            maybe_addr = locator.recv() => {
                session.stop().await;
                return maybe_addr;
            }
            _ = session.wait() => {
                // Session over; accept the next connection.
            }
        }
    }
}

/// Dial the peer for each resolved address. Connect failures and finished
/// sessions wait for the next locator event (no automatic retry).
pub async fn run_initiator(
    mut locator: mpsc::Receiver<PeerAddress>,
    deps: SessionDeps,
    connect_timeout: Duration,
) {
    let mut next = locator.recv().await;
    while let Some(addr) = next {
        let remote = format!("{}:{}", addr.host, addr.port);
        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(&remote)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(%remote, "connect failed: {e}");
                let _ = deps.events.send(LinkEvent::ConnectionError(e.to_string()));
                next = locator.recv().await;
                continue;
            }
            Err(_) => {
                warn!(%remote, "connect timed out");
                let _ = deps
                    .events
                    .send(LinkEvent::ConnectionError(format!("connect to {remote} timed out")));
                next = locator.recv().await;
                continue;
            }
        };
        info!(%remote, "connected to peer");
        let mut session = Session::spawn(stream, Role::Initiator, deps.clone());
        next = tokio::select! {
            maybe_addr = locator.recv() => {
                session.stop().await;
                maybe_addr
            }
            _ = session.wait() => locator.recv().await,
        };
    }
}
