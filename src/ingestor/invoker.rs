//! Single-shot provider rendezvous.
//!
//! The invoker opens an ephemeral listener, hands its port to whatever
//! triggers the provider, then treats "accept one connection and read to
//! EOF" as a single timed operation. The provider connects back, pushes one
//! JSON document (no length prefix; connection close is the frame
//! boundary) and disconnects.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tracing::debug;
use url::Url;

use super::launcher::ProviderLauncher;
use crate::errors::ProviderError;
use crate::models::{Provider, ProviderKind, RawPayload};

/// The only payload envelope version this bridge understands. Documents
/// declaring a greater version are rejected; forward compatibility is
/// explicitly not attempted.
pub const SUPPORTED_PAYLOAD_VERSION: i64 = 1;

pub struct ProviderInvoker {
    launcher: Arc<dyn ProviderLauncher>,
    accept_timeout: Duration,
}

impl ProviderInvoker {
    pub fn new(launcher: Arc<dyn ProviderLauncher>, accept_timeout: Duration) -> Self {
        Self {
            launcher,
            accept_timeout,
        }
    }

    /// Collect one provider's payload. The listening socket is scoped to
    /// this call and released on every exit path.
    pub async fn collect(&self, provider: &Provider) -> Result<RawPayload, ProviderError> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| ProviderError::Socket {
                provider: provider.name.clone(),
                source: e,
            })?;
        let port = listener
            .local_addr()
            .map_err(|e| ProviderError::Socket {
                provider: provider.name.clone(),
                source: e,
            })?
            .port();

        let address = invocation_address(provider, port)?;
        debug!(
            "Invoking provider '{}' with rendezvous port {}",
            provider.name, port
        );
        self.launcher.launch(provider, &address).await?;

        let bytes = self.await_push(provider, &listener, port).await?;
        if bytes.is_empty() {
            // The peer connected and closed without pushing anything;
            // indistinguishable from never replying as far as the merge is
            // concerned.
            return Err(ProviderError::Timeout {
                provider: provider.name.clone(),
                port,
                timeout_secs: self.accept_timeout.as_secs(),
            });
        }

        let text = String::from_utf8(bytes).map_err(|e| ProviderError::Protocol {
            provider: provider.name.clone(),
            message: format!("payload is not valid UTF-8: {}", e),
        })?;
        debug!(
            "Provider '{}' pushed {} bytes",
            provider.name,
            text.len()
        );

        if provider.kind == ProviderKind::Raw {
            return Ok(RawPayload::Text(text));
        }

        let document: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| ProviderError::Protocol {
                provider: provider.name.clone(),
                message: format!("payload is not valid JSON: {}", e),
            })?;

        if let Some(object) = document.as_object() {
            let version = object
                .get("version")
                .and_then(|v| v.as_i64())
                .unwrap_or(SUPPORTED_PAYLOAD_VERSION);
            if version > SUPPORTED_PAYLOAD_VERSION {
                return Err(ProviderError::Protocol {
                    provider: provider.name.clone(),
                    message: format!("unsupported payload version {}", version),
                });
            }
        }

        Ok(RawPayload::Document(document))
    }

    /// Accept exactly one inbound connection and read until the peer
    /// closes, all under one timeout budget.
    async fn await_push(
        &self,
        provider: &Provider,
        listener: &TcpListener,
        port: u16,
    ) -> Result<Vec<u8>, ProviderError> {
        let transfer = async {
            let (mut stream, peer) = listener.accept().await?;
            debug!("Provider '{}' connected from {}", provider.name, peer);
            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes).await?;
            Ok::<Vec<u8>, std::io::Error>(bytes)
        };

        match tokio::time::timeout(self.accept_timeout, transfer).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => Err(ProviderError::Socket {
                provider: provider.name.clone(),
                source: e,
            }),
            Err(_) => Err(ProviderError::Timeout {
                provider: provider.name.clone(),
                port,
                timeout_secs: self.accept_timeout.as_secs(),
            }),
        }
    }
}

/// Build the provider invocation address by appending the rendezvous port
/// as a query parameter to the configured base address.
fn invocation_address(provider: &Provider, port: u16) -> Result<Url, ProviderError> {
    let mut url = Url::parse(&provider.address).map_err(|e| ProviderError::Launch {
        provider: provider.name.clone(),
        message: format!("invalid provider address '{}': {}", provider.address, e),
    })?;
    url.query_pairs_mut().append_pair("port", &port.to_string());
    Ok(url)
}
