use crm::GatewayError;
use thiserror::Error;
use tracking::StoreError;

#[derive(Error, Debug)]
pub enum WorkerError {
    /// Malformed or incomplete envelope; never retried.
    #[error("invalid event envelope: {0}")]
    Validation(String),

    /// Another worker holds the creator role and has not recorded a case
    /// id yet. The message must stay on the queue for redelivery.
    #[error("case creation in progress for this correlation id")]
    CreationInProgress,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkerError {
    /// Whether the transport should redeliver the message.
    ///
    /// Metadata-attach failures are only retryable when the deployment
    /// opts in; everything else is fixed by the error's nature.
    pub fn is_retryable(&self, retry_metadata_failures: bool) -> bool {
        match self {
            WorkerError::CreationInProgress => true,
            WorkerError::Gateway(GatewayError::MetadataFailed(_)) => retry_metadata_failures,
            WorkerError::Validation(_) | WorkerError::Gateway(_) | WorkerError::Store(_) => false,
        }
    }
}
