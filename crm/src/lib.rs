//! CRM gateway boundary.
//!
//! Everything the coordinator needs from the remote CRM: entity
//! resolution, case and submission creation, metadata attachment, and
//! bearer-token acquisition. The remote API's error-as-value responses
//! are surfaced as typed [`GatewayError`] variants.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;

pub use auth::{OAuthTokenProvider, StaticTokenProvider, TokenProvider};
pub use client::CrmClient;
pub use config::{AuthConfig, CrmConfig};
pub use error::GatewayError;
pub use gateway::{CaseCreated, CaseFields, CaseRequest, CrmGateway, MetadataRequest};
