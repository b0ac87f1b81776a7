//! Call Gateway — WebSocket signaling for incoming/outgoing calls.
//!
//! A tagged-union protocol carried over `tokio-tungstenite`, narrowed to
//! signaling only: this crate's Orchestrator does not mix audio from multiple
//! participants, it just preempts whatever it's doing into `Calling` and
//! bridges the call's audio to the existing Audio Source/Sink.
//!
//! Preemption/hangup timing:
//! - On an incoming offer, any running background task is cancelled and
//!   given [`CALL_TASK_DRAIN_TIMEOUT`] to exit (polled every
//!   [`CALL_TASK_DRAIN_POLL`]) before the call is accepted regardless.
//! - On hang-up, the local device is held for [`CALL_HANGUP_DEVICE_RELEASE`]
//!   before being handed back to the Wake Detector, to drain any
//!   in-flight audio buffers.

use crate::constants::{
    CALL_CONNECTION_IDLE_TIMEOUT, CALL_HANGUP_DEVICE_RELEASE, CALL_TASK_DRAIN_POLL, CALL_TASK_DRAIN_TIMEOUT,
};
use crate::error::{MirrorError, Result as MirrorResult};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Signaling protocol messages exchanged with the call-gateway collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CallMessage {
    Offer { call_id: Uuid, caller_name: String, sdp: String },
    Answer { call_id: Uuid, sdp: String },
    IceCandidate { call_id: Uuid, candidate: String },
    HangUp { call_id: Uuid },
    Busy { call_id: Uuid },
}

/// Events the gateway surfaces to the Orchestrator's tick loop.
#[derive(Debug, Clone)]
pub enum CallEvent {
    IncomingOffer { call_id: Uuid, caller_name: String },
    HungUp { call_id: Uuid },
    Failed { call_id: Uuid, reason: String },
}

pub struct CallGateway {
    events_tx: mpsc::Sender<CallEvent>,
    tls: Option<TlsAcceptor>,
}

impl CallGateway {
    pub fn new(events_tx: mpsc::Sender<CallEvent>) -> Self {
        Self { events_tx, tls: None }
    }

    /// Loads `cert_path`/`key_path` (PEM) and enables TLS on the signaling
    /// endpoint. Both files are optional at the deployment level; absence
    /// of either is not an error here — the caller decides whether to
    /// call this at all.
    pub fn with_tls(mut self, cert_path: &Path, key_path: &Path) -> MirrorResult<Self> {
        // Idempotent: rustls 0.23 requires a process-level crypto provider
        // installed before the first `ServerConfig::builder()` call; a
        // second install attempt (e.g. a second `CallGateway` in tests) is
        // harmless and its error is ignored.
        let _ = tokio_rustls::rustls::crypto::ring::default_provider().install_default();
        let certs = load_certs(cert_path)?;
        let key = load_private_key(key_path)?;
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| MirrorError::Config(format!("invalid TLS cert/key pair: {e}")))?;
        self.tls = Some(TlsAcceptor::from(Arc::new(config)));
        Ok(self)
    }

    /// Bind `addr` and accept signaling connections until `cancel` fires.
    /// Connections are upgraded to TLS first when [`with_tls`] configured
    /// an acceptor; otherwise the socket is used directly.
    pub async fn listen(self: Arc<Self>, addr: SocketAddr, cancel: CancellationToken) -> crate::error::Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| crate::error::MirrorError::NetworkTransient(e.to_string()))?;
        info!("call gateway listening on {addr} (tls={})", self.tls.is_some());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            warn!("call gateway accept error: {e}");
                            continue;
                        }
                    };
                    let gateway = self.clone();
                    let conn_cancel = cancel.child_token();
                    tokio::spawn(async move {
                        let result = match &gateway.tls {
                            Some(acceptor) => match acceptor.accept(stream).await {
                                Ok(tls_stream) => gateway.handle_connection(tls_stream, conn_cancel).await,
                                Err(e) => Err(MirrorError::NetworkTransient(format!("TLS handshake failed: {e}"))),
                            },
                            None => gateway.handle_connection(stream, conn_cancel).await,
                        };
                        if let Err(e) = result {
                            warn!("call connection from {peer} ended with error: {e}");
                        }
                    });
                }
            }
        }
    }

    async fn handle_connection<S>(&self, stream: S, cancel: CancellationToken) -> crate::error::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| crate::error::MirrorError::NetworkTransient(e.to_string()))?;
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.close().await;
                    return Ok(());
                }
                msg = tokio::time::timeout(CALL_CONNECTION_IDLE_TIMEOUT, read.next()) => {
                    let msg = match msg {
                        Ok(Some(Ok(m))) => m,
                        Ok(Some(Err(e))) => return Err(crate::error::MirrorError::NetworkTransient(e.to_string())),
                        Ok(None) => return Ok(()),
                        Err(_) => {
                            warn!("call connection idle for {:?}; closing", CALL_CONNECTION_IDLE_TIMEOUT);
                            let _ = write.close().await;
                            return Ok(());
                        }
                    };
                    if let Message::Text(text) = msg {
                        match serde_json::from_str::<CallMessage>(&text) {
                            Ok(CallMessage::Offer { call_id, caller_name, .. }) => {
                                let _ = self.events_tx.send(CallEvent::IncomingOffer { call_id, caller_name }).await;
                            }
                            Ok(CallMessage::HangUp { call_id }) => {
                                let _ = self.events_tx.send(CallEvent::HungUp { call_id }).await;
                                tokio::time::sleep(CALL_HANGUP_DEVICE_RELEASE).await;
                                let _ = write.close().await;
                                return Ok(());
                            }
                            Ok(_) => {}
                            Err(e) => warn!("unparseable call message: {e}"),
                        }
                    }
                }
            }
        }
    }
}

fn load_certs(path: &Path) -> MirrorResult<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path).map_err(MirrorError::Io)?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| MirrorError::Config(format!("failed to parse {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(MirrorError::Config(format!("no certificates found in {}", path.display())));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> MirrorResult<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path).map_err(MirrorError::Io)?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| MirrorError::Config(format!("failed to parse {}: {e}", path.display())))?
        .ok_or_else(|| MirrorError::Config(format!("no private key found in {}", path.display())))
}

/// Waits for `token` to become the sole owner (cancellation acknowledged by
/// every background task) for up to [`CALL_TASK_DRAIN_TIMEOUT`], polling
/// every [`CALL_TASK_DRAIN_POLL`]. Always returns after the timeout even if
/// tasks are still draining — an incoming call is never refused just
/// because cleanup is slow.
pub async fn drain_for_call(mut still_running: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + CALL_TASK_DRAIN_TIMEOUT;
    while still_running() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(CALL_TASK_DRAIN_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_certs_rejects_file_with_no_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, b"not a certificate\n").unwrap();
        assert!(load_certs(&path).is_err());
    }

    #[test]
    fn load_private_key_rejects_file_with_no_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, b"not a key\n").unwrap();
        assert!(load_private_key(&path).is_err());
    }

    #[test]
    fn with_tls_surfaces_a_config_error_for_missing_files() {
        let (tx, _rx) = mpsc::channel(1);
        let gateway = CallGateway::new(tx);
        let result = gateway.with_tls(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"));
        assert!(result.is_err());
    }

    #[test]
    fn call_message_round_trips_through_json() {
        let msg = CallMessage::Offer { call_id: Uuid::nil(), caller_name: "Mom".into(), sdp: "v=0".into() };
        let json = serde_json::to_string(&msg).unwrap();
        let back: CallMessage = serde_json::from_str(&json).unwrap();
        match back {
            CallMessage::Offer { caller_name, .. } => assert_eq!(caller_name, "Mom"),
            _ => panic!("wrong variant"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drain_for_call_returns_promptly_once_not_running() {
        let mut calls = 0;
        drain_for_call(|| {
            calls += 1;
            false
        })
        .await;
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_for_call_times_out_if_never_stops() {
        let start = tokio::time::Instant::now();
        drain_for_call(|| true).await;
        assert!(tokio::time::Instant::now() >= start + CALL_TASK_DRAIN_TIMEOUT);
    }
}
