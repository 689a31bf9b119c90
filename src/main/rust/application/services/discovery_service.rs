use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::application::services::signal::wait_for_signal;
use crate::domain::ports::{DiscoveryProbe, MetricsReporter};
use crate::domain::value_objects::DiscoverySnapshot;

const SNAPSHOT_BUFFER: usize = 4;

/// Periodically probes the network and publishes one snapshot per cycle
pub struct DiscoveryService {
    probe: Arc<dyn DiscoveryProbe>,
    interval: Duration,
    metrics: Arc<dyn MetricsReporter>,
    subscribers: Vec<mpsc::Sender<DiscoverySnapshot>>,
}

impl DiscoveryService {
    pub fn new(
        probe: Arc<dyn DiscoveryProbe>,
        interval: Duration,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Self {
        Self {
            probe,
            interval,
            metrics,
            subscribers: Vec::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn subscribe(&mut self) -> mpsc::Receiver<DiscoverySnapshot> {
        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        self.subscribers.push(tx);
        rx
    }

    /// Run a single probe cycle.
    ///
    /// A failed probe is not fatal: it yields an empty snapshot, which the
    /// registry counts as a missed cycle for every device.
    pub async fn probe_once(&self) -> DiscoverySnapshot {
        match self.probe.probe_once().await {
            Ok(devices) => {
                let snapshot = DiscoverySnapshot::new(Instant::now(), devices);
                self.metrics.report_discovery_cycle(snapshot.len(), false);
                tracing::debug!(devices = snapshot.len(), "Discovery cycle complete");
                snapshot
            }
            Err(e) => {
                tracing::warn!("Discovery probe failed: {}", e);
                self.metrics.report_discovery_cycle(0, true);
                DiscoverySnapshot::empty(Instant::now())
            }
        }
    }

    /// Probe every interval until shutdown or until nobody is listening
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Discovery started");

        loop {
            tokio::select! {
                _ = wait_for_signal(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            let snapshot = tokio::select! {
                _ = wait_for_signal(&mut shutdown) => break,
                snapshot = self.probe_once() => snapshot,
            };

            if !self.publish(snapshot).await {
                tracing::info!("No discovery subscribers left");
                break;
            }
        }

        tracing::info!("Discovery stopped");
    }

    async fn publish(&mut self, snapshot: DiscoverySnapshot) -> bool {
        let mut open = Vec::with_capacity(self.subscribers.len());
        for tx in self.subscribers.drain(..) {
            if tx.send(snapshot.clone()).await.is_ok() {
                open.push(tx);
            }
        }
        self.subscribers = open;
        !self.subscribers.is_empty()
    }
}
