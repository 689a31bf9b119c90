use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::application::services::session_status::device_name;
use crate::application::services::signal::wait_for_signal;
use crate::application::services::{
    FramePipeline, FrameQueue, FrameReceiver, PacketOutcome, SessionStatus,
};
use crate::domain::entities::{ConnectionLifecycle, FpsMeter, ReconnectBackoff};
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{FrameDecoder, MetricsReporter, StreamConnector, StreamTransport};
use crate::domain::value_objects::{
    BackoffPolicy, ConnectionState, DeviceDescriptor, DeviceId, MediaPacket, SessionConfig,
};

/// Upper bound for telling the camera we are leaving
const TEARDOWN_TIMEOUT: Duration = Duration::from_millis(200);

enum ConnectOutcome {
    Connected(Box<dyn StreamTransport>),
    Failed(DomainError),
    Cancelled,
}

enum StreamOutcome {
    Failed(DomainError),
    Cancelled,
}

/// One device's connection state machine, run as its own task
///
/// Connects, streams into its [`FramePipeline`], and on any failure waits a
/// jittered backoff before trying again. Retries never stop on their own; the
/// only way out is a close request from the owning [`SessionHandle`].
pub struct StreamSession {
    device: DeviceDescriptor,
    lifecycle: ConnectionLifecycle,
    backoff: ReconnectBackoff,
    pipeline: FramePipeline,
    fps: FpsMeter,
    connector: Arc<dyn StreamConnector>,
    config: SessionConfig,
    metrics: Arc<dyn MetricsReporter>,
    close_rx: watch::Receiver<bool>,
    endpoint_rx: watch::Receiver<DeviceDescriptor>,
    status_tx: watch::Sender<SessionStatus>,
}

impl StreamSession {
    /// Build a session for `device` and start it on the runtime
    pub fn spawn(
        device: DeviceDescriptor,
        connector: Arc<dyn StreamConnector>,
        decoder: Box<dyn FrameDecoder>,
        backoff_policy: BackoffPolicy,
        config: SessionConfig,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Result<SessionHandle> {
        let pipeline = FramePipeline::new(
            device.id().clone(),
            decoder,
            config.frame_queue_capacity(),
            config.max_decode_failures(),
        )?;
        let queue = pipeline.queue_handle();

        let (close_tx, close_rx) = watch::channel(false);
        let (endpoint_tx, endpoint_rx) = watch::channel(device.clone());
        let (status_tx, status_rx) = watch::channel(SessionStatus::new(&device));

        let device_id = device.id().clone();
        let session = Self {
            device,
            lifecycle: ConnectionLifecycle::new(),
            backoff: ReconnectBackoff::new(backoff_policy),
            pipeline,
            fps: FpsMeter::default(),
            connector,
            config,
            metrics,
            close_rx,
            endpoint_rx,
            status_tx,
        };

        let task = tokio::spawn(session.run());

        Ok(SessionHandle {
            device_id,
            close_tx,
            endpoint_tx,
            status_rx,
            queue,
            task: Some(task),
        })
    }

    async fn run(mut self) {
        tracing::info!(
            device_id = %self.device.id(),
            url = %self.device.stream_url(),
            "Stream session started"
        );

        loop {
            if self.close_requested() {
                break;
            }
            self.refresh_endpoint();

            if let Err(e) = self.lifecycle.transition_to_connecting() {
                tracing::error!(device_id = %self.device.id(), "{}", e);
                break;
            }
            self.publish_state();

            let failure = match self.connect().await {
                ConnectOutcome::Cancelled => break,
                ConnectOutcome::Failed(e) => e,
                ConnectOutcome::Connected(transport) => match self.stream(transport).await {
                    StreamOutcome::Cancelled => break,
                    StreamOutcome::Failed(e) => e,
                },
            };

            if !self.wait_before_retry(failure).await {
                break;
            }
        }

        self.finish();
    }

    fn close_requested(&self) -> bool {
        *self.close_rx.borrow() || self.close_rx.has_changed().is_err()
    }

    /// Pick up an endpoint change pushed by the manager
    fn refresh_endpoint(&mut self) {
        if !self.endpoint_rx.has_changed().unwrap_or(false) {
            return;
        }

        let latest = self.endpoint_rx.borrow_and_update().clone();
        if !latest.same_endpoint(&self.device) {
            tracing::info!(
                device_id = %self.device.id(),
                from = %self.device.stream_url(),
                to = %latest.stream_url(),
                "Stream endpoint changed"
            );
        }
        self.device = latest;
    }

    async fn connect(&mut self) -> ConnectOutcome {
        let url = self.device.stream_url().to_string();
        let connect_timeout = self.config.connect_timeout();

        tracing::debug!(device_id = %self.device.id(), url = %url, "Connecting");

        let attempt = tokio::select! {
            _ = wait_for_signal(&mut self.close_rx) => return ConnectOutcome::Cancelled,
            result = timeout(connect_timeout, self.connector.connect(&url)) => result,
        };

        let transport = match attempt {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => return ConnectOutcome::Failed(e),
            Err(_) => return ConnectOutcome::Failed(DomainError::ConnectTimeout(connect_timeout)),
        };

        if let Err(e) = self.lifecycle.transition_to_streaming() {
            return ConnectOutcome::Failed(e);
        }
        self.backoff.reset();
        self.pipeline.reset();
        self.fps.clear();
        self.publish_state();

        tracing::info!(device_id = %self.device.id(), url = %url, "Streaming");
        ConnectOutcome::Connected(transport)
    }

    async fn stream(&mut self, mut transport: Box<dyn StreamTransport>) -> StreamOutcome {
        let health_check = self.config.health_check_interval();

        let outcome = loop {
            let next = tokio::select! {
                _ = wait_for_signal(&mut self.close_rx) => None,
                result = timeout(health_check, transport.next_packet()) => Some(result),
            };

            let packet = match next {
                None => break StreamOutcome::Cancelled,
                Some(Err(_)) => {
                    break StreamOutcome::Failed(DomainError::HealthCheckTimeout(health_check))
                }
                Some(Ok(Err(e))) => break StreamOutcome::Failed(e),
                Some(Ok(Ok(None))) => break StreamOutcome::Failed(DomainError::StreamClosed),
                Some(Ok(Ok(Some(packet)))) => packet,
            };

            if let Err(e) = self.handle_packet(&packet) {
                break StreamOutcome::Failed(e);
            }
        };

        if timeout(TEARDOWN_TIMEOUT, transport.close()).await.is_err() {
            tracing::debug!(device_id = %self.device.id(), "Teardown timed out");
        }
        outcome
    }

    fn handle_packet(&mut self, packet: &MediaPacket) -> Result<()> {
        match self.pipeline.ingest(packet) {
            Ok(PacketOutcome::Pending) => {}
            Ok(PacketOutcome::Delivered) => self.on_frame(false),
            Ok(PacketOutcome::DeliveredWithDrop) => self.on_frame(true),
            Ok(PacketOutcome::Discarded) => {
                self.metrics.report_decode_failure(self.device.id());
            }
            Err(e) => {
                self.metrics.report_decode_failure(self.device.id());
                return Err(e);
            }
        }
        Ok(())
    }

    fn on_frame(&mut self, dropped_oldest: bool) {
        let now = Instant::now();
        self.fps.record(now);
        let fps = self.fps.fps(now);
        let stats = self.pipeline.stats();

        self.metrics.report_frame_delivered(self.device.id());
        if dropped_oldest {
            self.metrics.report_frame_dropped(self.device.id());
        }
        self.metrics.report_input_fps(self.device.id(), fps);

        self.status_tx.send_modify(|status| {
            status.frames_delivered = stats.frames_decoded;
            status.frames_dropped = stats.frames_dropped;
            status.decode_failures = stats.decode_failures;
            status.input_fps = fps;
        });
    }

    /// Returns false if the session was closed while waiting
    async fn wait_before_retry(&mut self, failure: DomainError) -> bool {
        let delay = self.backoff.next_delay(&mut rand::thread_rng());
        let reason = failure.to_string();
        let uptime_ms = self
            .lifecycle
            .uptime()
            .map_or(0, |uptime| uptime.as_millis() as u64);

        let attempt = match self
            .lifecycle
            .transition_to_reconnecting(delay, Some(reason.clone()))
        {
            Ok(attempt) => attempt,
            Err(e) => {
                tracing::error!(device_id = %self.device.id(), "{}", e);
                return false;
            }
        };

        tracing::warn!(
            device_id = %self.device.id(),
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            uptime_ms,
            "Stream failed: {}, reconnecting",
            reason
        );
        self.metrics.report_reconnect_attempt(self.device.id());
        self.metrics.report_backoff(self.device.id(), delay.as_secs_f64());
        self.publish_state();

        tokio::select! {
            _ = wait_for_signal(&mut self.close_rx) => false,
            _ = sleep(delay) => true,
        }
    }

    fn finish(mut self) {
        self.lifecycle.close(Some("session closed".to_string()));
        self.pipeline.close();
        self.publish_state();

        tracing::info!(
            device_id = %self.device.id(),
            frames = self.pipeline.stats().frames_decoded,
            transitions = self.lifecycle.transition_count(),
            "Stream session closed"
        );
    }

    fn publish_state(&self) {
        let state = *self.lifecycle.current_state();
        let retry_count = self.lifecycle.retry_count();
        let next_retry_at = self.lifecycle.next_retry_at();
        let reason = self
            .lifecycle
            .last_transition()
            .and_then(|transition| transition.reason.clone());
        let device = &self.device;

        self.metrics.report_state_change(device.id(), &state);
        self.status_tx.send_modify(|status| {
            status.state = state;
            status.retry_count = retry_count;
            status.next_retry_at = next_retry_at;
            status.address = device.address();
            status.stream_url = device.stream_url().to_string();
            status.name = device_name(device);
            match state {
                ConnectionState::Reconnecting { .. } => status.last_error = reason,
                ConnectionState::Streaming => status.last_error = None,
                _ => {}
            }
            if !state.is_streaming() {
                status.input_fps = 0.0;
            }
        });
    }
}

/// Manager-side handle to a running [`StreamSession`]
///
/// Dropping the handle also stops the session.
pub struct SessionHandle {
    device_id: DeviceId,
    close_tx: watch::Sender<bool>,
    endpoint_tx: watch::Sender<DeviceDescriptor>,
    status_rx: watch::Receiver<SessionStatus>,
    queue: FrameQueue,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn state(&self) -> ConnectionState {
        self.status_rx.borrow().state
    }

    pub fn status(&self) -> SessionStatus {
        self.status_rx.borrow().clone()
    }

    pub fn status_receiver(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    pub fn frames(&self) -> FrameReceiver {
        self.queue.receiver()
    }

    /// Hand a newer sighting to the session; used on its next attempt
    pub fn update_endpoint(&self, device: DeviceDescriptor) {
        let _ = self.endpoint_tx.send(device);
    }

    /// True once the session task has exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Stop the session, waiting at most `grace` for it to release its
    /// resources before aborting the task.
    pub async fn close(mut self, grace: Duration) -> ConnectionState {
        let _ = self.close_tx.send(true);

        if let Some(mut task) = self.task.take() {
            match timeout(grace, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(device_id = %self.device_id, "Session task failed: {}", e);
                }
                Err(_) => {
                    tracing::warn!(
                        device_id = %self.device_id,
                        grace_ms = grace.as_millis() as u64,
                        "Session did not close within grace period, aborting"
                    );
                    task.abort();
                }
            }
        }

        // An aborted or panicked task never closed its queue.
        self.queue.close();
        ConnectionState::Closed
    }
}
