use std::time::Duration;

use serde::Deserialize;
use url::Url;

fn default_batch_size() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// Worker loop configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct WorkerConfig {
    /// Messages pulled per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sleep between polls when the queue is empty, milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// When true, a failed metadata attach leaves the message on the
    /// queue for redelivery instead of dropping it.
    #[serde(default)]
    pub retry_metadata_failures: bool,

    /// Outbound case-created events. Absent means events are discarded.
    #[serde(default)]
    pub events: Option<EventsConfig>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct EventsConfig {
    pub webhook_url: Url,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_metadata_failures: false,
            events: None,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
