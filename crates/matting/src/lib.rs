//! HTTP client for the remote background-removal workflow.
//!
//! [`api::MattingApi`] wraps the three HTTP calls (upload, run workflow,
//! download), [`parse`] extracts the output URL from a workflow result, and
//! [`provider::HttpMattingProvider`] plugs both into the engine's
//! `MattingProvider` contract.

pub mod api;
pub mod parse;
pub mod provider;

pub use api::{MattingApi, MattingApiError, MattingConfig};
pub use provider::HttpMattingProvider;
