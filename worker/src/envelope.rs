use serde::Deserialize;

/// CloudEvents-style event envelope delivered on the inbound queue.
///
/// Only the fields the worker reads are modeled; unknown fields are
/// ignored. All content is optional at parse time so that a single
/// validation pass in the transformer decides what is actually missing.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub data: Option<EventData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub correlation_id: Option<String>,
    /// Customer reference, resolved to a CRM contact.
    pub customer_ref: Option<String>,
    /// Business reference, resolved to a CRM account.
    pub business_ref: Option<String>,
    pub case: Option<CaseHints>,
    pub file: Option<FileDescriptor>,
}

/// Optional case-level hints supplied by the producer.
#[derive(Debug, Clone, Deserialize)]
pub struct CaseHints {
    pub title: Option<String>,
    pub queue: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileDescriptor {
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    pub url: Option<String>,
}

impl Envelope {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}
