//! Case tracking store.
//!
//! One record per correlation id, claimed atomically so that exactly one
//! caller becomes the creator of the CRM case even when workers race.

pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use store::{CaseStore, CaseTrackingRecord, Claim, StoreError};
