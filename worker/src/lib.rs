//! Queue worker for CRM case creation.
//!
//! The pipeline: a transport message is parsed into an [`envelope::Envelope`],
//! the [`coordinator::Coordinator`] claims the correlation id in the tracking
//! store and drives the create / add-metadata / skip / retry transition, and
//! the [`dispatcher::Dispatcher`] maps the result to a transport disposition.
//! Deduplication correctness rests entirely on the store's atomic claim; the
//! worker holds no locks of its own.

pub mod config;
pub mod consumer;
pub mod coordinator;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod metrics_defs;
pub mod publisher;
pub mod transform;

pub use config::WorkerConfig;
pub use consumer::{Consumer, MemoryQueue, QueueError, QueueMessage, QueueSource};
pub use coordinator::{CaseState, Coordinator, Outcome};
pub use dispatcher::{Dispatcher, Disposition};
pub use envelope::Envelope;
pub use error::WorkerError;
pub use publisher::{EventPublisher, NoopPublisher, WebhookPublisher};
