use crate::store::{CaseStore, CaseTrackingRecord, Claim, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// In-process store backed by a mutex-guarded map.
///
/// The claim runs inside one critical section, which gives it the same
/// single-winner guarantee as the database-backed upsert. Suitable for
/// tests and single-process local runs; multi-worker deployments need
/// [`crate::PostgresStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<String, CaseTrackingRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn claim(&self, correlation_id: &str, file_id: &str) -> Result<Claim, StoreError> {
        let mut records = self.records.lock();

        if let Some(record) = records.get(correlation_id) {
            return Ok(Claim::for_existing_record(record, file_id));
        }

        records.insert(
            correlation_id.to_string(),
            CaseTrackingRecord {
                correlation_id: correlation_id.to_string(),
                case_id: None,
                creator_file_id: file_id.to_string(),
                processed_file_ids: Vec::new(),
                created_at: Utc::now(),
            },
        );

        Ok(Claim::for_new_record())
    }

    async fn mark_file_processed(
        &self,
        correlation_id: &str,
        file_id: &str,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(correlation_id)
            .ok_or_else(|| StoreError::NotFound {
                correlation_id: correlation_id.to_string(),
            })?;

        if !record.processed_file_ids.iter().any(|id| id == file_id) {
            record.processed_file_ids.push(file_id.to_string());
        }

        Ok(())
    }

    async fn update_case_id(
        &self,
        correlation_id: &str,
        case_id: &str,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(correlation_id)
            .ok_or_else(|| StoreError::NotFound {
                correlation_id: correlation_id.to_string(),
            })?;

        match record.case_id.as_deref() {
            None => {
                record.case_id = Some(case_id.to_string());
                Ok(())
            }
            Some(existing) if existing == case_id => Ok(()),
            Some(_) => Err(StoreError::CaseIdConflict {
                correlation_id: correlation_id.to_string(),
            }),
        }
    }

    async fn get(&self, correlation_id: &str) -> Result<Option<CaseTrackingRecord>, StoreError> {
        Ok(self.records.lock().get(correlation_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_claim_wins_then_followers_observe_record() {
        let store = MemoryStore::new();

        let first = store.claim("corr-1", "file-1").await.unwrap();
        assert_eq!(first, Claim::for_new_record());

        // Same file, nothing processed yet: creator retry shape
        let retry = store.claim("corr-1", "file-1").await.unwrap();
        assert!(!retry.is_new && retry.is_creator && !retry.is_duplicate_file);

        // Different file while case id is still unset
        let follower = store.claim("corr-1", "file-2").await.unwrap();
        assert!(!follower.is_new && !follower.is_creator);
        assert_eq!(follower.case_id, None);
    }

    #[tokio::test]
    async fn concurrent_claims_have_exactly_one_winner() {
        let store = MemoryStore::new();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..32 {
            let store = store.clone();
            tasks.spawn(async move { store.claim("corr-race", &format!("file-{i}")).await });
        }

        let mut winners = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap().unwrap().is_new {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let record = store.get("corr-race").await.unwrap().unwrap();
        assert!(record.creator_file_id.starts_with("file-"));
    }

    #[tokio::test]
    async fn mark_file_processed_is_idempotent() {
        let store = MemoryStore::new();
        store.claim("corr-1", "file-1").await.unwrap();

        store.mark_file_processed("corr-1", "file-1").await.unwrap();
        store.mark_file_processed("corr-1", "file-1").await.unwrap();

        let record = store.get("corr-1").await.unwrap().unwrap();
        assert_eq!(record.processed_file_ids, vec!["file-1".to_string()]);
    }

    #[tokio::test]
    async fn case_id_is_set_once() {
        let store = MemoryStore::new();
        store.claim("corr-1", "file-1").await.unwrap();

        store.update_case_id("corr-1", "case-1").await.unwrap();
        // Idempotent for the same value
        store.update_case_id("corr-1", "case-1").await.unwrap();

        let err = store.update_case_id("corr-1", "case-2").await.unwrap_err();
        assert!(matches!(err, StoreError::CaseIdConflict { .. }));

        let record = store.get("corr-1").await.unwrap().unwrap();
        assert_eq!(record.case_id.as_deref(), Some("case-1"));
    }

    #[tokio::test]
    async fn mutations_on_missing_record_fail() {
        let store = MemoryStore::new();

        let err = store.mark_file_processed("missing", "f").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let err = store.update_case_id("missing", "c").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
