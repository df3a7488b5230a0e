//! API request and response data models.
//!
//! - [`rag`]: the ingestion upload and its normalized result
//!
//! Error bodies share one envelope, [`crate::errors::ErrorBody`].

pub mod rag;
