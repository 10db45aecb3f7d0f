use serde::Deserialize;
use url::Url;

/// CRM connection configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CrmConfig {
    /// Base URL of the CRM instance.
    pub base_url: Url,
    pub auth: AuthConfig,
}

/// OAuth2 client-credentials settings for the CRM tenant.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AuthConfig {
    pub token_endpoint: Url,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
}
