// PairLink node daemon: acceptor + optional initiator over one shared store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use pairlink_core::DeviceKeys;
use pairlink_node::config;
use pairlink_node::events::LinkEvent;
use pairlink_node::peer::{run_acceptor, run_initiator, PeerAddress};
use pairlink_node::session::{SessionConfig, SessionDeps, SignaturePolicy};
use pairlink_node::store::{MemoryMessageStore, MemorySecretStore};
use tokio::sync::{broadcast, mpsc};
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("pairlink-node {VERSION}");
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load();
    let keys = Arc::new(DeviceKeys::generate());
    let (events, event_log) = broadcast::channel(64);
    let deps = SessionDeps {
        keys,
        store: Arc::new(MemoryMessageStore::new()),
        secrets: Arc::new(MemorySecretStore::new()),
        events,
        config: SessionConfig {
            read_timeout: cfg.read_timeout_ms.map(Duration::from_millis),
            signature_policy: if cfg.accept_unverified {
                SignaturePolicy::AcceptAndLog
            } else {
                SignaturePolicy::Reject
            },
        },
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        tokio::spawn(log_events(event_log));

        // Locator senders stay alive for the daemon's lifetime; dropping one
        // would stop its supervisor.
        let (accept_tx, accept_rx) = mpsc::channel(4);
        accept_tx
            .send(PeerAddress {
                host: String::new(),
                port: cfg.listen_port,
            })
            .await?;
        tokio::spawn(run_acceptor(accept_rx, deps.clone()));

        let mut _initiator_tx = None;
        if let (Some(host), Some(port)) = (cfg.peer_host.clone(), cfg.peer_port) {
            let (tx, rx) = mpsc::channel(4);
            tx.send(PeerAddress { host, port }).await?;
            tokio::spawn(run_initiator(
                rx,
                deps.clone(),
                Duration::from_millis(cfg.connect_timeout_ms),
            ));
            _initiator_tx = Some(tx);
        }

        shutdown_signal().await
    })?;
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<LinkEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => info!(?event, "link event"),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix). Tasks exit with the runtime.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
