use std::time::Instant;

use tracing::{error, info, warn};

use crate::coordinator::{Coordinator, Outcome};
use crate::envelope::Envelope;
use crate::metrics_defs::{
    CASES_CREATED, DUPLICATES_SKIPPED, MESSAGES_RECEIVED, MESSAGES_RETAINED, METADATA_ATTACHED,
    POISON_MESSAGES, PROCESSING_DURATION,
};
use shared::{counter, histogram};

/// What the transport should do with the message after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove the message from the queue.
    Delete,
    /// Leave the message on the queue for redelivery.
    Retain,
}

/// Maps one raw queue message to a transport disposition.
///
/// Policy lives here, processing lives in the coordinator: unparseable
/// messages are poison and deleted, retryable errors retain the message,
/// everything else is logged and deleted so the queue cannot wedge on a
/// message that will never succeed.
pub struct Dispatcher {
    coordinator: Coordinator,
    retry_metadata_failures: bool,
}

impl Dispatcher {
    pub fn new(coordinator: Coordinator, retry_metadata_failures: bool) -> Self {
        Dispatcher {
            coordinator,
            retry_metadata_failures,
        }
    }

    pub async fn dispatch(&self, body: &[u8]) -> Disposition {
        counter!(MESSAGES_RECEIVED).increment(1);
        let started = Instant::now();

        let envelope = match Envelope::parse(body) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(error = %err, "unparseable message, removing from queue");
                counter!(POISON_MESSAGES).increment(1);
                return Disposition::Delete;
            }
        };

        let disposition = match self.coordinator.process(&envelope).await {
            Ok(Outcome::Created { case_id }) => {
                counter!(CASES_CREATED).increment(1);
                info!(case_id = %case_id, "message processed, case created");
                Disposition::Delete
            }
            Ok(Outcome::MetadataAttached { case_id }) => {
                counter!(METADATA_ATTACHED).increment(1);
                info!(case_id = %case_id, "message processed, metadata attached");
                Disposition::Delete
            }
            Ok(Outcome::Skipped { case_id }) => {
                counter!(DUPLICATES_SKIPPED).increment(1);
                info!(case_id = ?case_id, "duplicate message skipped");
                Disposition::Delete
            }
            Err(err) if err.is_retryable(self.retry_metadata_failures) => {
                counter!(MESSAGES_RETAINED).increment(1);
                warn!(error = %err, "retaining message for redelivery");
                Disposition::Retain
            }
            Err(err) => {
                error!(error = %err, "message failed permanently, removing from queue");
                Disposition::Delete
            }
        };

        histogram!(PROCESSING_DURATION).record(started.elapsed().as_secs_f64());
        disposition
    }
}
