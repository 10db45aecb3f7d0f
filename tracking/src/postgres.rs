use crate::store::{CaseStore, CaseTrackingRecord, Claim, StoreError};
use async_trait::async_trait;
use sqlx::PgPool;

/// Postgres-backed store.
///
/// The primary key on `correlation_id` is the uniqueness constraint the
/// claim protocol depends on; `ensure_schema` must have run (or an
/// equivalent migration been applied) before any claim is issued in a
/// multi-worker deployment.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS case_tracking (
                correlation_id TEXT PRIMARY KEY,
                case_id TEXT,
                creator_file_id TEXT NOT NULL,
                processed_file_ids TEXT[] NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch(&self, correlation_id: &str) -> Result<CaseTrackingRecord, StoreError> {
        let record = sqlx::query_as::<_, CaseTrackingRecord>(
            r#"
            SELECT correlation_id, case_id, creator_file_id, processed_file_ids, created_at
            FROM case_tracking
            WHERE correlation_id = $1
            "#,
        )
        .bind(correlation_id)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| StoreError::NotFound {
            correlation_id: correlation_id.to_string(),
        })
    }
}

#[async_trait]
impl CaseStore for PostgresStore {
    async fn claim(&self, correlation_id: &str, file_id: &str) -> Result<Claim, StoreError> {
        // Fields are only set on the insert branch; a lost race leaves the
        // existing row untouched and is not an error.
        let result = sqlx::query(
            r#"
            INSERT INTO case_tracking (correlation_id, creator_file_id)
            VALUES ($1, $2)
            ON CONFLICT (correlation_id) DO NOTHING
            "#,
        )
        .bind(correlation_id)
        .bind(file_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(Claim::for_new_record());
        }

        // Records are never deleted, so the row that won the insert is
        // still there. case_id and the processed set only grow, which makes
        // this read a safe stand-in for the pre-update state.
        let record = self.fetch(correlation_id).await?;
        Ok(Claim::for_existing_record(&record, file_id))
    }

    async fn mark_file_processed(
        &self,
        correlation_id: &str,
        file_id: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE case_tracking
            SET processed_file_ids = array_append(processed_file_ids, $2)
            WHERE correlation_id = $1 AND NOT ($2 = ANY(processed_file_ids))
            "#,
        )
        .bind(correlation_id)
        .bind(file_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Either already present (fine) or the record is missing.
            self.fetch(correlation_id).await?;
        }

        Ok(())
    }

    async fn update_case_id(
        &self,
        correlation_id: &str,
        case_id: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE case_tracking
            SET case_id = $2
            WHERE correlation_id = $1 AND (case_id IS NULL OR case_id = $2)
            "#,
        )
        .bind(correlation_id)
        .bind(case_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let record = self.fetch(correlation_id).await?;
            if record.case_id.as_deref() != Some(case_id) {
                return Err(StoreError::CaseIdConflict {
                    correlation_id: correlation_id.to_string(),
                });
            }
        }

        Ok(())
    }

    async fn get(&self, correlation_id: &str) -> Result<Option<CaseTrackingRecord>, StoreError> {
        match self.fetch(correlation_id).await {
            Ok(record) => Ok(Some(record)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
