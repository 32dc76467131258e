use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iptv_bridge::{
    config::Config,
    ingestor::{launcher_from_config, ConsumerNotifier, MergeScheduler},
    merger::{create_merge_notification_channel, MergeOrchestrator},
    web::BridgeServer,
};

#[derive(Parser)]
#[command(name = "iptv-bridge")]
#[command(version = "0.1.0")]
#[command(about = "A local aggregation bridge merging provider playlists and guides for PVR consumers")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with specified level
    let log_filter = if cli.log_level == "trace" {
        format!("iptv_bridge={},tower_http=trace", cli.log_level)
    } else {
        format!("iptv_bridge={}", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting IPTV Bridge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration from specified file
    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!("Configuration loaded from: {}", cli.config);

    // Override config with CLI arguments
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    let enabled = config.providers.iter().filter(|p| p.enabled).count();
    info!(
        "{} providers configured ({} enabled), output directory: {}",
        config.providers.len(),
        enabled,
        config.storage.output_dir.display()
    );

    let launcher = launcher_from_config(&config.launcher)?;
    let (notify_tx, notify_rx) = create_merge_notification_channel();
    let orchestrator = Arc::new(MergeOrchestrator::new(&config, launcher, notify_tx));

    // Poke the PVR consumer after successful merges, if configured
    if let Some(command) = config.merge.restart_command.clone() {
        let notifier = ConsumerNotifier::new(command, notify_rx);
        tokio::spawn(notifier.run());
        info!("Consumer restart command registered");
    }

    // Start scheduler service
    let scheduler = MergeScheduler::new(
        orchestrator.clone(),
        config.merge.update_cron.clone(),
        config.merge.startup_delay_seconds,
    );
    tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            tracing::error!("Scheduler service failed: {}", e);
        }
    });

    let server = BridgeServer::new(&config, orchestrator);
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    server.stop().await;

    Ok(())
}
