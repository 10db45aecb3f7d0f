use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

pub const CASE_CREATED_EVENT_TYPE: &str = "io.caseflow.crm.case.created";
const EVENT_SOURCE: &str = "caseflow";

#[derive(Error, Debug)]
#[error("event publication failed: {0}")]
pub struct PublishError(pub String);

/// CloudEvents envelope emitted after a case is created or augmented.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CaseCreatedEvent {
    pub id: String,
    pub source: String,
    pub specversion: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub datacontenttype: String,
    pub time: DateTime<Utc>,
    pub data: CaseCreatedData,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CaseCreatedData {
    pub correlation_id: String,
    pub case_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_ref: Option<String>,
}

impl CaseCreatedEvent {
    pub fn new(data: CaseCreatedData) -> Self {
        CaseCreatedEvent {
            id: Uuid::new_v4().to_string(),
            source: EVENT_SOURCE.to_string(),
            specversion: "1.0".to_string(),
            event_type: CASE_CREATED_EVENT_TYPE.to_string(),
            datacontenttype: "application/json".to_string(),
            time: Utc::now(),
            data,
        }
    }
}

/// Outbound notification sink. Publication is best-effort from the
/// coordinator's perspective: failures are logged by the caller and never
/// fail the message being processed.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &CaseCreatedEvent) -> Result<(), PublishError>;
}

/// Discards events. Default when no events sink is configured.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _event: &CaseCreatedEvent) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Posts events to a configured webhook endpoint.
pub struct WebhookPublisher {
    url: Url,
    client: reqwest::Client,
}

impl WebhookPublisher {
    pub fn new(url: Url) -> Self {
        WebhookPublisher {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EventPublisher for WebhookPublisher {
    async fn publish(&self, event: &CaseCreatedEvent) -> Result<(), PublishError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(event)
            .send()
            .await
            .map_err(|err| PublishError(err.to_string()))?;

        if !response.status().is_success() {
            return Err(PublishError(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
