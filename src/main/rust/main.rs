use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use pipeline_camera_grid::{
    serve_metrics, CameraGridService, Config, DeviceRegistry, DiscoveryService,
    H264DecoderFactory, MetricsReporter, PresentationEvent, PrometheusReporter, RtspConnector,
    StreamConnectionManager, WsDiscoveryProbe,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration
    let config = Config::parse();
    config.validate()?;

    // Initialize logging
    let filter = if config.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // Initialize metrics
    PrometheusReporter::init_metrics()?;

    info!("Starting camera grid v{}", env!("CARGO_PKG_VERSION"));
    info!("  Discovery interval: {} ms", config.discovery_interval_ms);
    info!("  Missed probe threshold: {}", config.missed_probe_threshold);
    info!("  Max sessions: {}", config.max_sessions);
    info!("  Metrics port: {}", config.metrics_port);

    // Convert CLI config to domain configs
    let backoff_policy = config
        .to_backoff_policy()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let session_config = config
        .to_session_config()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let discovery_config = config.to_discovery_config();

    // Create infrastructure implementations (dependency injection)
    let metrics: Arc<dyn MetricsReporter> = Arc::new(PrometheusReporter::new());
    let probe = Arc::new(WsDiscoveryProbe::new(discovery_config.clone()));
    let connector = Arc::new(RtspConnector::new(session_config.connect_timeout()));

    // Create application services
    let discovery = DiscoveryService::new(probe, discovery_config.interval, metrics.clone());
    let manager = StreamConnectionManager::new(
        connector,
        Arc::new(H264DecoderFactory),
        backoff_policy,
        session_config,
        config.to_manager_config(),
        metrics.clone(),
    );
    let grid = CameraGridService::new(
        DeviceRegistry::new(config.to_registry_config()),
        manager,
        metrics,
    );

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    // Handle Ctrl+C
    let shutdown_for_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
        }
        info!("Received shutdown signal");
        let _ = shutdown_for_signal.send(true);
    });

    // Start metrics server
    let metrics_server = tokio::spawn(serve_metrics(
        config.metrics_port,
        grid.status_board(),
        shutdown_rx.clone(),
    ));

    let presenter = tokio::spawn(present(grid.subscribe()));

    grid.run(discovery, shutdown_rx).await;

    // Discovery may also end on its own; stop the metrics server either way
    let _ = shutdown_tx.send(true);

    if let Err(e) = metrics_server.await {
        error!("Metrics server failed: {}", e);
    }
    presenter.abort();

    info!("Camera grid shutdown complete");
    Ok(())
}

/// Stand-in for a renderer: drains every stream and logs its progress
async fn present(mut events: broadcast::Receiver<PresentationEvent>) {
    const LOG_EVERY: u64 = 300;

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Presentation events lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            PresentationEvent::DeviceStreamAdded {
                device_id,
                address,
                frames,
            } => {
                info!(device_id = %device_id, address = %address, "Stream added to grid");
                tokio::spawn(async move {
                    let mut received = 0u64;
                    while let Some(frame) = frames.recv().await {
                        received += 1;
                        if received % LOG_EVERY == 1 {
                            debug!(
                                device_id = %frame.device_id,
                                sequence = frame.sequence,
                                keyframe = frame.keyframe,
                                bytes = frame.data.len(),
                                "Frame"
                            );
                        }
                    }
                    debug!(device_id = %device_id, frames = received, "Stream drained");
                });
            }
            PresentationEvent::DeviceStreamRemoved { device_id } => {
                info!(device_id = %device_id, "Stream removed from grid");
            }
        }
    }
}
