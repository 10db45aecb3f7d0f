use crate::envelope::{Envelope, EventData};
use crate::error::WorkerError;
use crm::{CaseFields, CaseRequest, MetadataRequest};

const DEFAULT_FILE_NAME: &str = "unknown";
const DEFAULT_CASE_TITLE: &str = "Document Upload";
const DEFAULT_QUEUE: &str = "Outgoing";
const DEFAULT_DOCUMENT_TYPE: &str = "default";

/// Correlation id and file id extracted before any claim is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageKey {
    pub correlation_id: String,
    pub file_id: String,
}

fn data_section(envelope: &Envelope) -> Result<&EventData, WorkerError> {
    envelope
        .data
        .as_ref()
        .ok_or_else(|| WorkerError::Validation("missing data section".into()))
}

fn required(value: Option<&str>, field: &str) -> Result<String, WorkerError> {
    value
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| WorkerError::Validation(format!("missing required field: {field}")))
}

/// Extracts the claim key from the envelope. Validation failures here mean
/// the message can never be processed and is treated as poison.
pub fn message_key(envelope: &Envelope) -> Result<MessageKey, WorkerError> {
    let data = data_section(envelope)?;
    let file = data
        .file
        .as_ref()
        .ok_or_else(|| WorkerError::Validation("missing file descriptor".into()))?;

    Ok(MessageKey {
        correlation_id: required(data.correlation_id.as_deref(), "correlation_id")?,
        file_id: required(file.file_id.as_deref(), "file.file_id")?,
    })
}

/// Maps the envelope to the gateway's case-creation request.
///
/// Pure: no I/O, no clock, no side effects. Defaulting policy: missing
/// file name becomes "unknown", missing file URL becomes the empty
/// string, missing case title becomes "Document Upload".
pub fn case_request(envelope: &Envelope) -> Result<CaseRequest, WorkerError> {
    let data = data_section(envelope)?;
    let key = message_key(envelope)?;

    let customer_ref = required(data.customer_ref.as_deref(), "customer_ref")?;
    let business_ref = required(data.business_ref.as_deref(), "business_ref")?;

    let file = data.file.as_ref();
    let file_name = file
        .and_then(|f| f.file_name.as_deref())
        .unwrap_or(DEFAULT_FILE_NAME);
    let file_url = file.and_then(|f| f.url.as_deref()).unwrap_or_default();

    let hints = data.case.as_ref();
    let title = hints
        .and_then(|c| c.title.as_deref())
        .unwrap_or(DEFAULT_CASE_TITLE);
    let queue = hints
        .and_then(|c| c.queue.as_deref())
        .unwrap_or(DEFAULT_QUEUE);

    Ok(CaseRequest {
        correlation_id: key.correlation_id.clone(),
        customer_ref,
        business_ref,
        case: CaseFields {
            title: title.to_string(),
            description: format!("Document uploaded: {file_name}"),
            queue: queue.to_string(),
        },
        submission_subject: format!("Document Upload - {file_name}"),
        submission_description: format!(
            "File uploaded: {file_name}\nCorrelation ID: {}",
            key.correlation_id
        ),
        document_name: file_name.to_string(),
        document_type: DEFAULT_DOCUMENT_TYPE.to_string(),
        file_url: file_url.to_string(),
    })
}

/// Maps the envelope to a metadata-attach request for an existing case.
pub fn metadata_request(
    envelope: &Envelope,
    case_id: &str,
    submission_id: &str,
) -> Result<MetadataRequest, WorkerError> {
    let data = data_section(envelope)?;
    let key = message_key(envelope)?;

    let file = data.file.as_ref();
    let file_name = file
        .and_then(|f| f.file_name.as_deref())
        .unwrap_or(DEFAULT_FILE_NAME);
    let file_url = file.and_then(|f| f.url.as_deref()).unwrap_or_default();

    Ok(MetadataRequest {
        correlation_id: key.correlation_id,
        customer_ref: required(data.customer_ref.as_deref(), "customer_ref")?,
        business_ref: required(data.business_ref.as_deref(), "business_ref")?,
        case_id: case_id.to_string(),
        submission_id: submission_id.to_string(),
        document_name: file_name.to_string(),
        document_type: DEFAULT_DOCUMENT_TYPE.to_string(),
        file_url: file_url.to_string(),
    })
}
