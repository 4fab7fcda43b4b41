use std::time::Duration;

use anyhow::{Context as _, Result};
use cc_computer::Computer;
use cc_harbor::{telemetry, Cli, DeviceEvent, Harbor, ServerConfig};
use cc_link::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init()?;

    let cli = Cli::parse();
    let config = ServerConfig::try_from(cli)?;
    info!(
        listen_addr = %config.listen_addr,
        queue_depth = config.link.queue_depth,
        handshake_timeout_secs = config.link.handshake_timeout.as_secs(),
        "starting cc-harbor"
    );

    let harbor = Harbor::new(&config);
    harbor.on_device(greet);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listener")?;
    info!("cc-harbor listening on {}", config.listen_addr);

    harbor.serve(listener, shutdown_signal()).await?;
    info!("graceful shutdown complete");
    Ok(())
}

async fn greet(event: DeviceEvent) {
    let computer = Computer::new(event.client);
    let cx = Context::with_timeout(Duration::from_secs(5));
    match computer.version(&cx).await {
        Ok(version) => info!(
            device_key = %event.key,
            device_type = %event.device_type,
            %version,
            "device ready"
        ),
        Err(err) => warn!(device_key = %event.key, error = %err, "version query failed"),
    }
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}
