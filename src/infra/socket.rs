use anyhow::Result;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use std::fmt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, warn};
use url::Url;

use crate::domain::events::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Refused,
    Protocol,
}

#[derive(Debug, Clone)]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Refused,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Protocol,
            message: message.into(),
        }
    }

    /// Sorts a failed WebSocket handshake. The peer answering with something
    /// other than an upgrade is a protocol failure, not a refusal.
    pub fn handshake(endpoint: &str, err: WsError) -> Self {
        let message = format!("{}: {}", endpoint, err);
        match err {
            WsError::Url(_) | WsError::Http(_) | WsError::HttpFormat(_) | WsError::Protocol(_) => {
                Self::protocol(message)
            }
            _ => Self::refused(message),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransportErrorKind::Timeout => write!(f, "connection timed out: {}", self.message),
            TransportErrorKind::Refused => write!(f, "connection refused: {}", self.message),
            TransportErrorKind::Protocol => write!(f, "protocol error: {}", self.message),
        }
    }
}

impl std::error::Error for TransportError {}

/// An established link. Dropping `outbound` closes the connection; `inbound`
/// yields `None` once the peer goes away.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<Envelope>,
    pub inbound: mpsc::UnboundedReceiver<Envelope>,
}

/// Opens links to the notification server. The connection manager owns the
/// only caller.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, endpoint: &Url) -> BoxFuture<'static, Result<TransportLink>>;
}

/// JSON-over-WebSocket connector.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, endpoint: &Url) -> BoxFuture<'static, Result<TransportLink>> {
        let endpoint = endpoint.to_string();
        Box::pin(async move {
            let (stream, _response) = connect_async(endpoint.as_str())
                .await
                .map_err(|err| TransportError::handshake(&endpoint, err))?;
            debug!(endpoint = %endpoint, "websocket connected");

            let (mut sink, mut source) = stream.split();
            let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Envelope>();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Envelope>();

            tokio::spawn(async move {
                while let Some(envelope) = outbound_rx.recv().await {
                    let text = match serde_json::to_string(&envelope) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(error = ?err, event = %envelope.event, "failed to encode frame");
                            continue;
                        }
                    };
                    if let Err(err) = sink.send(Message::Text(text)).await {
                        debug!(error = ?err, "websocket write failed");
                        return;
                    }
                }
                let _ = sink.close().await;
            });

            tokio::spawn(async move {
                while let Some(frame) = source.next().await {
                    let text = match frame {
                        Ok(Message::Text(text)) => text,
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(err) => {
                            debug!(error = ?err, "websocket read failed");
                            break;
                        }
                    };
                    let envelope: Envelope = match serde_json::from_str(&text) {
                        Ok(envelope) => envelope,
                        Err(err) => {
                            warn!(error = ?err, "dropping malformed frame");
                            continue;
                        }
                    };
                    if inbound_tx.send(envelope).is_err() {
                        break;
                    }
                }
            });

            Ok(TransportLink {
                outbound: outbound_tx,
                inbound: inbound_rx,
            })
        })
    }
}
