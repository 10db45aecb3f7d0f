use crate::error::GatewayError;
use crate::gateway::{CaseCreated, CaseRequest, CrmGateway, MetadataRequest};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

/// Reqwest-backed client for an OData-style CRM API.
pub struct CrmClient {
    base_url: Url,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ODataList<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
struct ContactRow {
    contactid: String,
}

#[derive(Deserialize)]
struct AccountRow {
    accountid: String,
}

#[derive(Deserialize)]
struct CaseRow {
    incidentid: String,
}

#[derive(Deserialize)]
struct SubmissionRow {
    submissionid: String,
}

#[derive(Deserialize)]
struct MetadataRow {
    metadataid: String,
}

impl CrmClient {
    pub fn new(base_url: Url) -> Self {
        CrmClient {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// Looks up the CRM contact id for a customer reference. The CRM
    /// returns 200 with an empty result set when nothing matches, so an
    /// empty list is the "not found" signal here.
    async fn contact_id(&self, token: &str, customer_ref: &str) -> Result<String, GatewayError> {
        let response = self
            .client
            .get(self.endpoint("/contacts"))
            .header("Authorization", token)
            .query(&[
                ("$select", "contactid"),
                ("$filter", &format!("customer_ref eq '{customer_ref}'")),
            ])
            .send()
            .await?;

        let rows = response.error_for_status()?.json::<ODataList<ContactRow>>().await?;

        rows.value
            .into_iter()
            .next()
            .map(|row| row.contactid)
            .ok_or_else(|| GatewayError::LookupFailed {
                entity: "contact",
                reference: customer_ref.to_string(),
            })
    }

    async fn account_id(&self, token: &str, business_ref: &str) -> Result<String, GatewayError> {
        let response = self
            .client
            .get(self.endpoint("/accounts"))
            .header("Authorization", token)
            .query(&[
                ("$select", "accountid"),
                ("$filter", &format!("business_ref eq '{business_ref}'")),
            ])
            .send()
            .await?;

        let rows = response.error_for_status()?.json::<ODataList<AccountRow>>().await?;

        rows.value
            .into_iter()
            .next()
            .map(|row| row.accountid)
            .ok_or_else(|| GatewayError::LookupFailed {
                entity: "account",
                reference: business_ref.to_string(),
            })
    }

    async fn ensure_contact_and_account(
        &self,
        token: &str,
        customer_ref: &str,
        business_ref: &str,
    ) -> Result<(String, String), GatewayError> {
        let contact_id = self.contact_id(token, customer_ref).await?;
        let account_id = self.account_id(token, business_ref).await?;
        Ok((contact_id, account_id))
    }
}

#[async_trait]
impl CrmGateway for CrmClient {
    async fn create_case_with_submission(
        &self,
        token: &str,
        request: &CaseRequest,
    ) -> Result<CaseCreated, GatewayError> {
        let (contact_id, account_id) = self
            .ensure_contact_and_account(token, &request.customer_ref, &request.business_ref)
            .await?;

        let case_payload = json!({
            "title": request.case.title,
            "description": request.case.description,
            "queue": request.case.queue,
            "contactid": contact_id,
            "accountid": account_id,
        });

        let response = self
            .client
            .post(self.endpoint("/incidents"))
            .header("Authorization", token)
            .header("Prefer", "return=representation")
            .json(&case_payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::CreateFailed(format!(
                "case creation returned {}",
                response.status()
            )));
        }

        let case_id = response.json::<CaseRow>().await?.incidentid;
        debug!(correlation_id = %request.correlation_id, case_id = %case_id, "case created");

        let submission_payload = json!({
            "caseid": case_id,
            "subject": request.submission_subject,
            "description": request.submission_description,
            "document": {
                "name": request.document_name,
                "document_type": request.document_type,
                "file_url": request.file_url,
            },
            "contactid": contact_id,
            "accountid": account_id,
        });

        let response = self
            .client
            .post(self.endpoint("/submissions"))
            .header("Authorization", token)
            .header("Prefer", "return=representation")
            .json(&submission_payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::CreateFailed(format!(
                "submission activity creation returned {}",
                response.status()
            )));
        }

        // The CRM assigns the submission identifier on its side; read it
        // back rather than trusting the activity response body.
        let submission_id = self.submission_id(token, &case_id).await?;

        Ok(CaseCreated {
            case_id,
            contact_id,
            account_id,
            submission_id,
        })
    }

    async fn submission_id(&self, token: &str, case_id: &str) -> Result<String, GatewayError> {
        let response = self
            .client
            .get(self.endpoint("/submissions"))
            .header("Authorization", token)
            .query(&[
                ("$select", "submissionid"),
                ("$filter", &format!("caseid eq '{case_id}'")),
            ])
            .send()
            .await?;

        let rows = response
            .error_for_status()?
            .json::<ODataList<SubmissionRow>>()
            .await?;

        rows.value
            .into_iter()
            .next()
            .map(|row| row.submissionid)
            .ok_or_else(|| GatewayError::SubmissionLookupFailed {
                case_id: case_id.to_string(),
            })
    }

    async fn attach_metadata(
        &self,
        token: &str,
        request: &MetadataRequest,
    ) -> Result<String, GatewayError> {
        let (contact_id, account_id) = self
            .ensure_contact_and_account(token, &request.customer_ref, &request.business_ref)
            .await?;

        let payload = json!({
            "submissionid": request.submission_id,
            "caseid": request.case_id,
            "name": request.document_name,
            "document_type": request.document_type,
            "file_url": request.file_url,
            "contactid": contact_id,
            "accountid": account_id,
        });

        let response = self
            .client
            .post(self.endpoint("/metadata"))
            .header("Authorization", token)
            .header("Prefer", "return=representation")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::MetadataFailed(format!(
                "metadata creation returned {}",
                response.status()
            )));
        }

        let metadata_id = response.json::<MetadataRow>().await?.metadataid;
        debug!(
            correlation_id = %request.correlation_id,
            case_id = %request.case_id,
            metadata_id = %metadata_id,
            "metadata attached"
        );
        Ok(metadata_id)
    }
}
