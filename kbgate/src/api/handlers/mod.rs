//! HTTP request handlers.
//!
//! - [`rag`]: document ingestion (`POST /api/process-rag`)
//!
//! Handlers return [`crate::errors::Error`] on failure, which converts into the JSON error
//! envelope with a status code matching the failure category.

pub mod rag;
