use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::domain::errors::{DomainError, Result};
use crate::domain::value_objects::Frame;

#[derive(Debug, Default)]
struct QueueState {
    frames: VecDeque<Frame>,
    closed: bool,
    dropped: u64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panicking consumer must not wedge the producer.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Bounded frame queue that drops the oldest frame when full
///
/// Producer side of a session's frame delivery. Pushing never blocks and the
/// queue never holds more than `capacity` frames.
#[derive(Debug, Clone)]
pub struct FrameQueue {
    shared: Arc<Shared>,
}

impl FrameQueue {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(DomainError::InvalidQueueCapacity);
        }

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    frames: VecDeque::with_capacity(capacity),
                    ..Default::default()
                }),
                notify: Notify::new(),
                capacity,
            }),
        })
    }

    /// Enqueue `frame`, evicting and returning the oldest one if full.
    /// Frames pushed after [`close`](Self::close) are returned unqueued.
    pub fn push(&self, frame: Frame) -> Option<Frame> {
        let evicted = {
            let mut state = self.shared.lock();
            if state.closed {
                return Some(frame);
            }

            let evicted = if state.frames.len() >= self.shared.capacity {
                state.dropped += 1;
                state.frames.pop_front()
            } else {
                None
            };
            state.frames.push_back(frame);
            evicted
        };

        self.shared.notify.notify_waiters();
        evicted
    }

    /// Stop accepting frames and wake all receivers. Idempotent.
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_waiters();
    }

    pub fn receiver(&self) -> FrameReceiver {
        FrameReceiver {
            shared: self.shared.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.shared.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Frames evicted to make room since creation
    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }
}

/// Consumer side of a session's frame queue
///
/// Clones share the same queue: each frame is delivered to exactly one of
/// them.
#[derive(Debug, Clone)]
pub struct FrameReceiver {
    shared: Arc<Shared>,
}

impl FrameReceiver {
    /// Wait for the next frame. `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<Frame> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.lock();
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    pub fn try_recv(&self) -> Option<Frame> {
        self.shared.lock().frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}
