use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("no {entity} found for reference '{reference}'")]
    LookupFailed { entity: &'static str, reference: String },

    #[error("unable to create case with submission activity: {0}")]
    CreateFailed(String),

    #[error("unable to retrieve submission id for case '{case_id}'")]
    SubmissionLookupFailed { case_id: String },

    #[error("unable to attach metadata to existing case: {0}")]
    MetadataFailed(String),

    #[error("token acquisition failed: {0}")]
    Auth(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
