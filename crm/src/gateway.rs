use crate::error::GatewayError;
use async_trait::async_trait;
use serde::Serialize;

/// Case-level fields sent to the CRM when a case is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseFields {
    pub title: String,
    pub description: String,
    pub queue: String,
}

/// Request to create a case together with its online submission activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseRequest {
    pub correlation_id: String,
    /// Customer reference resolved to a CRM contact.
    pub customer_ref: String,
    /// Business reference resolved to a CRM account.
    pub business_ref: String,
    pub case: CaseFields,
    pub submission_subject: String,
    pub submission_description: String,
    pub document_name: String,
    pub document_type: String,
    pub file_url: String,
}

/// Request to attach file metadata to an existing case's submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataRequest {
    pub correlation_id: String,
    pub customer_ref: String,
    pub business_ref: String,
    pub case_id: String,
    pub submission_id: String,
    pub document_name: String,
    pub document_type: String,
    pub file_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseCreated {
    pub case_id: String,
    pub contact_id: String,
    pub account_id: String,
    pub submission_id: String,
}

/// Remote CRM operations consumed by the coordinator and the HTTP API.
#[async_trait]
pub trait CrmGateway: Send + Sync {
    /// Resolves the entity references, creates the case and its online
    /// submission activity, and returns the identifiers of everything
    /// created.
    async fn create_case_with_submission(
        &self,
        token: &str,
        request: &CaseRequest,
    ) -> Result<CaseCreated, GatewayError>;

    /// Fetches the submission identifier for an already-created case.
    async fn submission_id(&self, token: &str, case_id: &str) -> Result<String, GatewayError>;

    /// Attaches file metadata to the submission of an existing case and
    /// returns the metadata record id.
    async fn attach_metadata(
        &self,
        token: &str,
        request: &MetadataRequest,
    ) -> Result<String, GatewayError>;
}
