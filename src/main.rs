use anyhow::anyhow;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ayursutra_realtime::app::notifications::LedgerEvent;
use ayursutra_realtime::config::RealtimeConfig;
use ayursutra_realtime::RealtimeCore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RealtimeConfig::from_env()?;
    let user_id = std::env::var("USER_ID").map_err(|_| anyhow!("missing required env var: USER_ID"))?;

    let core = RealtimeCore::with_websocket(config);
    tracing::info!(endpoint = %core.config.endpoint, user_id = %user_id, "starting notification listener");

    let mut changes = core.store.subscribe();
    let mut status = core.session.connection_status();
    core.session.activate(&user_id);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(LedgerEvent::Added(record)) => {
                    tracing::info!(
                        id = %record.id,
                        kind = record.kind.as_str(),
                        unread = core.store.unread_count(),
                        "{}: {}",
                        record.title,
                        record.message
                    );
                }
                Ok(other) => tracing::debug!(change = ?other, "ledger changed"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "ledger change feed lagged");
                }
                Err(RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let connected = *status.borrow_and_update();
                tracing::info!(connected = connected, "connection status");
            }
            signal = &mut shutdown => {
                tracing::info!(
                    signal = signal,
                    user_id = %user_id,
                    unread = core.store.unread_count(),
                    "stopping notification listener"
                );
                break;
            }
        }
    }

    core.session.deactivate();
    Ok(())
}

/// Resolves with the name of the signal that asked the listener to stop.
async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for interrupt, relying on SIGTERM");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "cannot listen for SIGTERM, relying on interrupt");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => "interrupt",
        _ = terminate => "terminate",
    }
}
