use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

use crate::dispatcher::{Dispatcher, Disposition};

#[derive(Error, Debug)]
#[error("queue transport error: {0}")]
pub struct QueueError(pub String);

/// One delivery pulled from the transport. The receipt identifies this
/// delivery for deletion; redelivery of the same message yields a new
/// receipt.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub receipt: String,
    pub body: Vec<u8>,
}

/// Inbound transport with at-least-once delivery.
///
/// A message that is received but never deleted must eventually be
/// redelivered; deleting with a stale receipt is a no-op.
#[async_trait]
pub trait QueueSource: Send + Sync {
    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>, QueueError>;
    async fn delete(&self, receipt: &str) -> Result<(), QueueError>;
}

/// In-process queue for tests and local runs.
///
/// Received messages move to an in-flight map until deleted;
/// [`MemoryQueue::redeliver_inflight`] puts them back, modeling a
/// visibility timeout expiring.
#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<MemoryQueueState>,
}

#[derive(Default)]
struct MemoryQueueState {
    pending: Vec<Vec<u8>>,
    inflight: HashMap<String, Vec<u8>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        MemoryQueue::default()
    }

    pub fn push(&self, body: impl Into<Vec<u8>>) {
        self.inner.lock().pending.push(body.into());
    }

    /// Returns all undeleted in-flight messages to the pending queue.
    pub fn redeliver_inflight(&self) {
        let mut state = self.inner.lock();
        let bodies: Vec<Vec<u8>> = state.inflight.drain().map(|(_, body)| body).collect();
        state.pending.extend(bodies);
    }

    /// Periodically returns undeleted in-flight messages to the pending
    /// queue, standing in for a transport's visibility timeout. Runs until
    /// the task is dropped.
    pub async fn run_redelivery(&self, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            self.redeliver_inflight();
        }
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn inflight_len(&self) -> usize {
        self.inner.lock().inflight.len()
    }
}

#[async_trait]
impl QueueSource for MemoryQueue {
    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let mut state = self.inner.lock();
        let take = max.min(state.pending.len());
        let bodies: Vec<Vec<u8>> = state.pending.drain(..take).collect();
        let mut batch = Vec::with_capacity(bodies.len());
        for body in bodies {
            let receipt = Uuid::new_v4().to_string();
            state.inflight.insert(receipt.clone(), body.clone());
            batch.push(QueueMessage { receipt, body });
        }
        Ok(batch)
    }

    async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
        self.inner.lock().inflight.remove(receipt);
        Ok(())
    }
}

/// Pulls batches from the transport and feeds them to the dispatcher.
///
/// Messages within a batch are processed concurrently; retained messages
/// are simply not deleted, so the transport's redelivery mechanism picks
/// them up again.
pub struct Consumer {
    queue: Arc<dyn QueueSource>,
    dispatcher: Arc<Dispatcher>,
    batch_size: usize,
    poll_interval: Duration,
}

impl Consumer {
    pub fn new(
        queue: Arc<dyn QueueSource>,
        dispatcher: Arc<Dispatcher>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        Consumer {
            queue,
            dispatcher,
            batch_size,
            poll_interval,
        }
    }

    /// Receives and processes one batch. Returns how many messages were
    /// handled.
    pub async fn run_once(&self) -> Result<usize, QueueError> {
        let batch = self.queue.receive(self.batch_size).await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        let mut tasks = JoinSet::new();
        for message in batch {
            let queue = self.queue.clone();
            let dispatcher = self.dispatcher.clone();
            tasks.spawn(async move {
                let disposition = dispatcher.dispatch(&message.body).await;
                if disposition == Disposition::Delete {
                    if let Err(err) = queue.delete(&message.receipt).await {
                        error!(error = %err, "failed to delete message");
                    }
                }
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                error!(error = %err, "message task panicked");
            }
        }

        Ok(count)
    }

    /// Polls the transport until the process shuts down. Receive errors
    /// are logged and retried after the poll interval.
    pub async fn run(&self) {
        info!(batch_size = self.batch_size, "worker consumer started");
        loop {
            match self.run_once().await {
                Ok(0) => tokio::time::sleep(self.poll_interval).await,
                Ok(_) => {}
                Err(err) => {
                    error!(error = %err, "queue receive failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}
