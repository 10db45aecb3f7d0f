use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("no tracking record for correlation id '{correlation_id}'")]
    NotFound { correlation_id: String },

    #[error("case id already set for correlation id '{correlation_id}'")]
    CaseIdConflict { correlation_id: String },
}

/// Tracking record for one correlation id.
///
/// `creator_file_id` is fixed at insert and never changes. `case_id` goes
/// from None to Some at most once. `processed_file_ids` only grows and
/// holds each file id at most once.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct CaseTrackingRecord {
    pub correlation_id: String,
    pub case_id: Option<String>,
    pub creator_file_id: String,
    pub processed_file_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Pre-update state returned by [`CaseStore::claim`].
///
/// When the claim inserted a fresh record this is
/// `{is_new: true, is_duplicate_file: false, case_id: None, is_creator: true}`.
/// Otherwise the flags are derived from the record as it stood before the
/// call: `is_duplicate_file` when the file id is already in the processed
/// set, `is_creator` when the file id matches the creator's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub is_new: bool,
    pub is_duplicate_file: bool,
    pub case_id: Option<String>,
    pub is_creator: bool,
}

impl Claim {
    pub fn for_new_record() -> Self {
        Claim {
            is_new: true,
            is_duplicate_file: false,
            case_id: None,
            is_creator: true,
        }
    }

    pub fn for_existing_record(record: &CaseTrackingRecord, file_id: &str) -> Self {
        Claim {
            is_new: false,
            is_duplicate_file: record.processed_file_ids.iter().any(|id| id == file_id),
            case_id: record.case_id.clone(),
            is_creator: record.creator_file_id == file_id,
        }
    }
}

/// Store contract consumed by the case coordinator.
///
/// Records are never deleted by this subsystem.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Atomically inserts a record for the correlation id if absent and
    /// returns the pre-update state. Exactly one of any set of concurrent
    /// callers for the same correlation id observes `is_new = true`; all
    /// others observe the surviving record.
    async fn claim(&self, correlation_id: &str, file_id: &str) -> Result<Claim, StoreError>;

    /// Idempotently adds the file id to the record's processed set.
    async fn mark_file_processed(
        &self,
        correlation_id: &str,
        file_id: &str,
    ) -> Result<(), StoreError>;

    /// Sets the case id on the record. Setting the same value again is a
    /// no-op; setting a different value over an existing one is rejected.
    async fn update_case_id(&self, correlation_id: &str, case_id: &str)
    -> Result<(), StoreError>;

    /// Fetches the record, if one exists.
    async fn get(&self, correlation_id: &str) -> Result<Option<CaseTrackingRecord>, StoreError>;
}
