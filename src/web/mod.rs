//! HTTP surface of the bridge.
//!
//! Exactly two routes are meaningful, matched case-insensitively by the
//! fallback handler: the playlist document and the guide document. Each
//! accepted connection is handled on its own task, so a slow merge behind
//! one request never blocks another from being accepted.

use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::merger::MergeOrchestrator;
use crate::models::MergeKind;
use crate::utils;

pub mod handlers;

/// How long a stop waits for in-flight handlers before aborting them.
const STOP_GRACE: Duration = Duration::from_secs(30);

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<MergeOrchestrator>,
    /// Whether document requests force a fresh merge.
    pub force_refresh: bool,
}

struct RunningServer {
    addr: SocketAddr,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

pub struct BridgeServer {
    host: String,
    port: u16,
    state: AppState,
    running: Mutex<Option<RunningServer>>,
}

impl BridgeServer {
    pub fn new(config: &Config, orchestrator: Arc<MergeOrchestrator>) -> Self {
        Self {
            host: config.web.host.clone(),
            port: config.web.port,
            state: AppState {
                orchestrator,
                force_refresh: config.merge.force_refresh_on_request,
            },
            running: Mutex::new(None),
        }
    }

    /// Router with the document fallback and request tracing.
    pub fn router(state: AppState) -> Router {
        Router::new()
            .fallback(handlers::serve_document)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the listener and serve in a background task. Idempotent:
    /// calling start while already running is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if let Some(server) = running.as_ref() {
            debug!("Bridge server already running on {}", server.addr);
            return Ok(());
        }

        let listener =
            tokio::net::TcpListener::bind((self.host.as_str(), self.port)).await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = Self::router(self.state.clone());
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let host = utils::advertised_host(addr);
        info!("Bridge server started on {}", addr);
        info!(
            "Playlist URL: http://{}:{}/{}",
            host,
            addr.port(),
            MergeKind::Playlist.file_name()
        );
        info!(
            "EPG URL: http://{}:{}/{}",
            host,
            addr.port(),
            MergeKind::Epg.file_name()
        );

        *running = Some(RunningServer {
            addr,
            shutdown_tx,
            task,
        });
        Ok(())
    }

    /// Stop accepting, signal in-flight handlers and wait for them to
    /// drain; stubborn handlers are aborted after a grace period. The
    /// listening socket is released either way.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(server) = running.take() else {
            debug!("Bridge server not running");
            return;
        };

        let _ = server.shutdown_tx.send(());
        let mut task = server.task;
        match tokio::time::timeout(STOP_GRACE, &mut task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!("Bridge server exited with error: {}", e),
            Ok(Err(e)) => warn!("Bridge server task panicked: {}", e),
            Err(_) => {
                warn!("Graceful drain timed out; aborting in-flight handlers");
                task.abort();
                let _ = task.await;
            }
        }
        info!("Bridge server stopped");
    }

    /// The bound local address, once started.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|server| server.addr)
    }

    /// Discovery URL for the published playlist document, once started.
    pub async fn playlist_url(&self) -> Option<String> {
        self.document_url(MergeKind::Playlist).await
    }

    /// Discovery URL for the published guide document, once started.
    pub async fn epg_url(&self) -> Option<String> {
        self.document_url(MergeKind::Epg).await
    }

    async fn document_url(&self, kind: MergeKind) -> Option<String> {
        let addr = self.local_addr().await?;
        Some(format!(
            "http://{}:{}/{}",
            utils::advertised_host(addr),
            addr.port(),
            kind.file_name()
        ))
    }
}
