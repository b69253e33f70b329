//! Layer detection through an OpenAI-compatible vision chat endpoint.
//!
//! [`encode`] prepares the image (downscale, JPEG, base64), [`client`] sends
//! the chat completion request, [`extract`] turns the model's reply into
//! layer specs, and [`VisionAnalyzer`] ties them to the `Analyzer` contract.

pub mod analyzer;
pub mod client;
pub mod encode;
pub mod extract;

pub use analyzer::VisionAnalyzer;
pub use client::{VisionApiError, VisionClient, VisionConfig};
