//! Provider launch seam.
//!
//! The bridge never talks to a provider directly; it asks the host
//! environment to run the provider with an invocation address carrying the
//! rendezvous port, then waits for the provider to connect back. The
//! launch itself is fire-and-forget.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::config::{LauncherConfig, LauncherMode};
use crate::errors::ProviderError;
use crate::models::Provider;

#[async_trait]
pub trait ProviderLauncher: Send + Sync {
    /// Signal the host environment to start (or resume) the provider with
    /// the given invocation address. Must return without waiting for the
    /// provider to finish.
    async fn launch(&self, provider: &Provider, address: &Url) -> Result<(), ProviderError>;
}

/// Triggers providers with a detached HTTP GET against the invocation
/// address. Response and errors are logged, never surfaced: the rendezvous
/// timeout is the recovery mechanism.
pub struct HttpLauncher {
    client: reqwest::Client,
}

impl HttpLauncher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderLauncher for HttpLauncher {
    async fn launch(&self, provider: &Provider, address: &Url) -> Result<(), ProviderError> {
        debug!("Triggering provider '{}' via GET {}", provider.name, address);

        let client = self.client.clone();
        let url = address.clone();
        let name = provider.name.clone();
        tokio::spawn(async move {
            if let Err(e) = client.get(url.as_str()).send().await {
                warn!("Trigger request for provider '{}' failed: {}", name, e);
            }
        });

        Ok(())
    }
}

/// Triggers providers by spawning a configured shell command with `{url}`
/// replaced by the invocation address. The child is not awaited.
pub struct CommandLauncher {
    template: String,
}

impl CommandLauncher {
    pub fn new(template: String) -> Self {
        Self { template }
    }
}

#[async_trait]
impl ProviderLauncher for CommandLauncher {
    async fn launch(&self, provider: &Provider, address: &Url) -> Result<(), ProviderError> {
        let command = self.template.replace("{url}", address.as_str());
        debug!("Triggering provider '{}' via command: {}", provider.name, command);

        tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .spawn()
            .map_err(|e| ProviderError::Launch {
                provider: provider.name.clone(),
                message: format!("failed to spawn '{}': {}", command, e),
            })?;

        Ok(())
    }
}

/// Build the launcher the configuration asks for.
pub fn launcher_from_config(config: &LauncherConfig) -> Result<Arc<dyn ProviderLauncher>, ProviderError> {
    match config.mode {
        LauncherMode::Http => Ok(Arc::new(HttpLauncher::new())),
        LauncherMode::Command => {
            let template = config.command.clone().ok_or(ProviderError::Launch {
                provider: "<config>".to_string(),
                message: "launcher mode 'command' requires a command template".to_string(),
            })?;
            Ok(Arc::new(CommandLauncher::new(template)))
        }
    }
}
