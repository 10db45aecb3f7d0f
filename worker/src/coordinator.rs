use std::sync::Arc;

use tracing::{info, warn};

use crate::envelope::Envelope;
use crate::error::WorkerError;
use crate::publisher::{CaseCreatedData, CaseCreatedEvent, EventPublisher};
use crate::transform;
use crm::{CrmGateway, TokenProvider};
use tracking::{CaseStore, Claim};

/// Action selected for a message after claiming its correlation id.
///
/// Derived purely from the pre-update claim state; the checks are ordered
/// so that a duplicate file is always skipped, even when it belongs to the
/// creator of a record whose case id is already set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseState {
    /// This worker won the creator role (or is the creator retrying after
    /// a crash before the case id was recorded).
    Create,
    /// A case already exists; attach this file's metadata to it.
    AddMetadata(String),
    /// The file id was already processed for this correlation id. Carries
    /// the case id when one was recorded.
    SkipDuplicate(Option<String>),
    /// Another worker holds the creator role and has not recorded a case
    /// id yet; leave the message for redelivery.
    WaitRetry,
}

impl CaseState {
    pub fn from_claim(claim: &Claim) -> CaseState {
        if claim.is_duplicate_file {
            CaseState::SkipDuplicate(claim.case_id.clone())
        } else if let Some(case_id) = &claim.case_id {
            CaseState::AddMetadata(case_id.clone())
        } else if claim.is_new || claim.is_creator {
            CaseState::Create
        } else {
            CaseState::WaitRetry
        }
    }
}

/// What processing a message accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created { case_id: String },
    MetadataAttached { case_id: String },
    Skipped { case_id: Option<String> },
}

/// Drives one message through claim, CRM interaction, and tracking
/// bookkeeping.
///
/// Correctness of deduplication rests on the store's atomic claim: the
/// coordinator itself is stateless and safe to run from any number of
/// concurrent workers.
pub struct Coordinator {
    store: Arc<dyn CaseStore>,
    gateway: Arc<dyn CrmGateway>,
    tokens: Arc<dyn TokenProvider>,
    events: Arc<dyn EventPublisher>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn CaseStore>,
        gateway: Arc<dyn CrmGateway>,
        tokens: Arc<dyn TokenProvider>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Coordinator {
            store,
            gateway,
            tokens,
            events,
        }
    }

    pub async fn process(&self, envelope: &Envelope) -> Result<Outcome, WorkerError> {
        let key = transform::message_key(envelope)?;
        let claim = self.store.claim(&key.correlation_id, &key.file_id).await?;
        let state = CaseState::from_claim(&claim);

        info!(
            correlation_id = %key.correlation_id,
            file_id = %key.file_id,
            ?state,
            "claimed correlation id"
        );

        match state {
            CaseState::SkipDuplicate(case_id) => {
                info!(
                    correlation_id = %key.correlation_id,
                    file_id = %key.file_id,
                    "file already processed, skipping"
                );
                Ok(Outcome::Skipped { case_id })
            }
            CaseState::WaitRetry => Err(WorkerError::CreationInProgress),
            CaseState::Create => self.create_case(envelope).await,
            CaseState::AddMetadata(case_id) => self.add_metadata(envelope, &case_id).await,
        }
    }

    async fn create_case(&self, envelope: &Envelope) -> Result<Outcome, WorkerError> {
        let key = transform::message_key(envelope)?;
        let request = transform::case_request(envelope)?;

        let token = self.tokens.bearer_token().await?;
        let created = self
            .gateway
            .create_case_with_submission(&token, &request)
            .await?;

        // The case id must be durable before the file is marked processed:
        // if we crash between the two, redelivery finds the case id and
        // attaches metadata instead of creating a second case.
        self.store
            .update_case_id(&key.correlation_id, &created.case_id)
            .await?;
        self.store
            .mark_file_processed(&key.correlation_id, &key.file_id)
            .await?;

        info!(
            correlation_id = %key.correlation_id,
            case_id = %created.case_id,
            submission_id = %created.submission_id,
            "created case"
        );

        self.publish_created(&key.correlation_id, &created.case_id, envelope)
            .await;

        Ok(Outcome::Created {
            case_id: created.case_id,
        })
    }

    async fn add_metadata(
        &self,
        envelope: &Envelope,
        case_id: &str,
    ) -> Result<Outcome, WorkerError> {
        let key = transform::message_key(envelope)?;

        let token = self.tokens.bearer_token().await?;
        let submission_id = self.gateway.submission_id(&token, case_id).await?;
        let request = transform::metadata_request(envelope, case_id, &submission_id)?;
        let metadata_id = self.gateway.attach_metadata(&token, &request).await?;

        self.store
            .mark_file_processed(&key.correlation_id, &key.file_id)
            .await?;

        info!(
            correlation_id = %key.correlation_id,
            case_id = %case_id,
            metadata_id = %metadata_id,
            "attached metadata to existing case"
        );

        self.publish_created(&key.correlation_id, case_id, envelope)
            .await;

        Ok(Outcome::MetadataAttached {
            case_id: case_id.to_string(),
        })
    }

    /// Best-effort: a failed publication is logged and never fails the
    /// message.
    async fn publish_created(&self, correlation_id: &str, case_id: &str, envelope: &Envelope) {
        let data = envelope.data.as_ref();
        let event = CaseCreatedEvent::new(CaseCreatedData {
            correlation_id: correlation_id.to_string(),
            case_id: case_id.to_string(),
            customer_ref: data.and_then(|d| d.customer_ref.clone()),
            business_ref: data.and_then(|d| d.business_ref.clone()),
        });

        if let Err(err) = self.events.publish(&event).await {
            warn!(
                correlation_id = %correlation_id,
                case_id = %case_id,
                error = %err,
                "case-created event publication failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crm::{CaseCreated, CaseRequest, GatewayError, MetadataRequest, StaticTokenProvider};
    use parking_lot::Mutex;
    use tracking::{MemoryStore, StoreError};

    fn claim(is_new: bool, is_duplicate_file: bool, case_id: Option<&str>, is_creator: bool) -> Claim {
        Claim {
            is_new,
            is_duplicate_file,
            case_id: case_id.map(String::from),
            is_creator,
        }
    }

    #[test]
    fn duplicate_check_takes_precedence() {
        // Creator redelivery after everything completed
        assert_eq!(
            CaseState::from_claim(&claim(false, true, Some("case-1"), true)),
            CaseState::SkipDuplicate(Some("case-1".into()))
        );
        // Duplicate observed before the case id was recorded
        assert_eq!(
            CaseState::from_claim(&claim(false, true, None, false)),
            CaseState::SkipDuplicate(None)
        );
    }

    #[test]
    fn fresh_claim_and_creator_retry_both_create() {
        assert_eq!(
            CaseState::from_claim(&Claim::for_new_record()),
            CaseState::Create
        );
        // Creator crashed after the insert but before recording the case id
        assert_eq!(
            CaseState::from_claim(&claim(false, false, None, true)),
            CaseState::Create
        );
    }

    #[test]
    fn follower_waits_until_case_id_exists() {
        assert_eq!(
            CaseState::from_claim(&claim(false, false, None, false)),
            CaseState::WaitRetry
        );
        assert_eq!(
            CaseState::from_claim(&claim(false, false, Some("case-1"), false)),
            CaseState::AddMetadata("case-1".into())
        );
    }

    #[test]
    fn every_claim_combination_maps_to_a_state() {
        for is_new in [false, true] {
            for is_duplicate_file in [false, true] {
                for case_id in [None, Some("case-1")] {
                    for is_creator in [false, true] {
                        // Must not panic for any combination, including
                        // ones the store never actually produces.
                        let _ = CaseState::from_claim(&claim(
                            is_new,
                            is_duplicate_file,
                            case_id,
                            is_creator,
                        ));
                    }
                }
            }
        }
    }

    #[derive(Default)]
    struct GatewayCalls {
        create: Vec<CaseRequest>,
        submission_lookups: Vec<String>,
        attach: Vec<MetadataRequest>,
    }

    struct MockGateway {
        calls: Mutex<GatewayCalls>,
        fail_attach: bool,
    }

    impl MockGateway {
        fn new() -> Self {
            MockGateway {
                calls: Mutex::new(GatewayCalls::default()),
                fail_attach: false,
            }
        }

        fn failing_attach() -> Self {
            MockGateway {
                calls: Mutex::new(GatewayCalls::default()),
                fail_attach: true,
            }
        }
    }

    #[async_trait]
    impl CrmGateway for MockGateway {
        async fn create_case_with_submission(
            &self,
            _token: &str,
            request: &CaseRequest,
        ) -> Result<CaseCreated, GatewayError> {
            self.calls.lock().create.push(request.clone());
            Ok(CaseCreated {
                case_id: "case-1".into(),
                contact_id: "contact-1".into(),
                account_id: "account-1".into(),
                submission_id: "sub-1".into(),
            })
        }

        async fn submission_id(
            &self,
            _token: &str,
            case_id: &str,
        ) -> Result<String, GatewayError> {
            self.calls.lock().submission_lookups.push(case_id.into());
            Ok("sub-1".into())
        }

        async fn attach_metadata(
            &self,
            _token: &str,
            request: &MetadataRequest,
        ) -> Result<String, GatewayError> {
            if self.fail_attach {
                return Err(GatewayError::MetadataFailed("503".into()));
            }
            self.calls.lock().attach.push(request.clone());
            Ok("meta-1".into())
        }
    }

    /// Store wrapper that records the order of mutating calls.
    struct RecordingStore {
        inner: MemoryStore,
        ops: Mutex<Vec<String>>,
    }

    impl RecordingStore {
        fn new() -> Self {
            RecordingStore {
                inner: MemoryStore::new(),
                ops: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CaseStore for RecordingStore {
        async fn claim(&self, correlation_id: &str, file_id: &str) -> Result<Claim, StoreError> {
            self.ops.lock().push(format!("claim {file_id}"));
            self.inner.claim(correlation_id, file_id).await
        }

        async fn mark_file_processed(
            &self,
            correlation_id: &str,
            file_id: &str,
        ) -> Result<(), StoreError> {
            self.ops.lock().push(format!("mark {file_id}"));
            self.inner.mark_file_processed(correlation_id, file_id).await
        }

        async fn update_case_id(
            &self,
            correlation_id: &str,
            case_id: &str,
        ) -> Result<(), StoreError> {
            self.ops.lock().push(format!("update_case_id {case_id}"));
            self.inner.update_case_id(correlation_id, case_id).await
        }

        async fn get(
            &self,
            correlation_id: &str,
        ) -> Result<Option<tracking::CaseTrackingRecord>, StoreError> {
            self.inner.get(correlation_id).await
        }
    }

    struct RecordingPublisher {
        events: Mutex<Vec<CaseCreatedEvent>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(
            &self,
            event: &CaseCreatedEvent,
        ) -> Result<(), crate::publisher::PublishError> {
            self.events.lock().push(event.clone());
            Ok(())
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(
            &self,
            _event: &CaseCreatedEvent,
        ) -> Result<(), crate::publisher::PublishError> {
            Err(crate::publisher::PublishError("down".into()))
        }
    }

    fn envelope(file_id: &str) -> Envelope {
        Envelope::parse(
            format!(
                r#"{{
                    "data": {{
                        "correlation_id": "corr-1",
                        "customer_ref": "CRN-100",
                        "business_ref": "SBI-200",
                        "file": {{"file_id": "{file_id}", "file_name": "report.pdf"}}
                    }}
                }}"#
            )
            .as_bytes(),
        )
        .unwrap()
    }

    struct Harness {
        store: Arc<RecordingStore>,
        gateway: Arc<MockGateway>,
        publisher: Arc<RecordingPublisher>,
        coordinator: Coordinator,
    }

    fn harness(gateway: MockGateway) -> Harness {
        let store = Arc::new(RecordingStore::new());
        let gateway = Arc::new(gateway);
        let publisher = Arc::new(RecordingPublisher {
            events: Mutex::new(Vec::new()),
        });
        let coordinator = Coordinator::new(
            store.clone(),
            gateway.clone(),
            Arc::new(StaticTokenProvider::new("Bearer test")),
            publisher.clone(),
        );
        Harness {
            store,
            gateway,
            publisher,
            coordinator,
        }
    }

    #[tokio::test]
    async fn first_message_creates_case_and_records_it() {
        let h = harness(MockGateway::new());

        let outcome = h.coordinator.process(&envelope("file-1")).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Created {
                case_id: "case-1".into()
            }
        );

        let record = h.store.get("corr-1").await.unwrap().unwrap();
        assert_eq!(record.case_id.as_deref(), Some("case-1"));
        assert_eq!(record.processed_file_ids, vec!["file-1"]);

        // Case id is durable before the file is marked processed
        let ops = h.store.ops.lock().clone();
        assert_eq!(
            ops,
            vec!["claim file-1", "update_case_id case-1", "mark file-1"]
        );

        let events = h.publisher.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.case_id, "case-1");
        assert_eq!(events[0].data.customer_ref.as_deref(), Some("CRN-100"));
    }

    #[tokio::test]
    async fn second_file_attaches_metadata() {
        let h = harness(MockGateway::new());

        h.coordinator.process(&envelope("file-1")).await.unwrap();
        let outcome = h.coordinator.process(&envelope("file-2")).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::MetadataAttached {
                case_id: "case-1".into()
            }
        );

        let calls = h.gateway.calls.lock();
        assert_eq!(calls.create.len(), 1);
        assert_eq!(calls.submission_lookups, vec!["case-1"]);
        assert_eq!(calls.attach.len(), 1);
        assert_eq!(calls.attach[0].submission_id, "sub-1");

        let record = h.store.get("corr-1").await.unwrap().unwrap();
        assert_eq!(record.processed_file_ids, vec!["file-1", "file-2"]);
    }

    #[tokio::test]
    async fn metadata_attach_publishes_event() {
        let h = harness(MockGateway::new());

        h.coordinator.process(&envelope("file-1")).await.unwrap();
        h.coordinator.process(&envelope("file-2")).await.unwrap();

        // One publication per processed file: create and attach both notify
        let events = h.publisher.events.lock();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.data.case_id == "case-1"));
    }

    #[tokio::test]
    async fn redelivered_message_is_skipped_without_crm_calls() {
        let h = harness(MockGateway::new());

        h.coordinator.process(&envelope("file-1")).await.unwrap();
        let outcome = h.coordinator.process(&envelope("file-1")).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Skipped {
                case_id: Some("case-1".into())
            }
        );

        assert_eq!(h.gateway.calls.lock().create.len(), 1);
        assert!(h.gateway.calls.lock().attach.is_empty());
    }

    #[tokio::test]
    async fn follower_waits_while_creation_is_in_flight() {
        let h = harness(MockGateway::new());

        // Simulate a creator that claimed but has not recorded a case id
        h.store.claim("corr-1", "file-1").await.unwrap();

        let err = h.coordinator.process(&envelope("file-2")).await.unwrap_err();
        assert!(matches!(err, WorkerError::CreationInProgress));
        assert!(err.is_retryable(false));

        // No CRM traffic and no file marked for the waiting follower
        assert!(h.gateway.calls.lock().create.is_empty());
        let record = h.store.get("corr-1").await.unwrap().unwrap();
        assert!(record.processed_file_ids.is_empty());
    }

    #[tokio::test]
    async fn wait_retry_until_creator_finishes() {
        let h = harness(MockGateway::new());

        h.store.claim("corr-1", "file-1").await.unwrap();
        let err = h.coordinator.process(&envelope("file-2")).await.unwrap_err();
        assert!(matches!(err, WorkerError::CreationInProgress));

        // Creator completes; the redelivered follower now attaches metadata
        h.coordinator.process(&envelope("file-1")).await.unwrap();
        let outcome = h.coordinator.process(&envelope("file-2")).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::MetadataAttached {
                case_id: "case-1".into()
            }
        );
    }

    #[tokio::test]
    async fn failed_attach_leaves_file_unmarked() {
        let h = harness(MockGateway::failing_attach());

        h.coordinator.process(&envelope("file-1")).await.unwrap();
        let err = h.coordinator.process(&envelope("file-2")).await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::Gateway(GatewayError::MetadataFailed(_))
        ));

        // The file stays unmarked so a redelivery can try again
        let record = h.store.get("corr-1").await.unwrap().unwrap();
        assert_eq!(record.processed_file_ids, vec!["file-1"]);
    }

    #[tokio::test]
    async fn publish_failure_does_not_fail_the_message() {
        let store = Arc::new(RecordingStore::new());
        let coordinator = Coordinator::new(
            store.clone(),
            Arc::new(MockGateway::new()),
            Arc::new(StaticTokenProvider::new("Bearer test")),
            Arc::new(FailingPublisher),
        );

        let outcome = coordinator.process(&envelope("file-1")).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Created {
                case_id: "case-1".into()
            }
        );
    }

    #[tokio::test]
    async fn validation_failure_surfaces_before_any_claim() {
        let h = harness(MockGateway::new());

        let bad = Envelope::parse(br#"{"data": {"correlation_id": "corr-1"}}"#).unwrap();
        let err = h.coordinator.process(&bad).await.unwrap_err();
        assert!(matches!(err, WorkerError::Validation(_)));
        assert!(h.store.ops.lock().is_empty());
    }
}
