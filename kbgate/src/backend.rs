//! Client for the external document-processing backend.
//!
//! The backend is a black box that accepts the same multipart form the gateway receives
//! (`file`, `chunk_size`, `chunk_overlap`) and answers with a JSON object. This module only
//! knows how to rebuild that form and how to read the answer back; interpreting the answer is
//! the gateway's job.

use async_trait::async_trait;
use axum::http::StatusCode;
use reqwest::{
    Body, Client,
    multipart::{Form, Part},
};
use serde_json::Value;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};
use url::Url;

use crate::api::models::rag::{UploadRequest, UploadedFile};
use crate::staging::FileContent;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to reach document backend: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("document backend returned a non-JSON body (status {status}): {source}")]
    InvalidBody {
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },

    #[error("document backend returned {status} with a JSON body that is not an object")]
    UnexpectedBody { status: StatusCode },

    #[error("failed to reopen staged upload {file_name}: {source}")]
    Staged {
        file_name: String,
        #[source]
        source: std::io::Error,
    },
}

/// What the backend answered: its status and its parsed JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    pub status: StatusCode,
    pub body: Value,
}

/// Sends uploads to a document backend.
///
/// The production implementation is [`ReqwestBackend`]; tests substitute recording fakes.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Issue exactly one request carrying `upload` to `endpoint`.
    async fn send(&self, endpoint: &Url, upload: &UploadRequest) -> Result<BackendReply, BackendError>;
}

/// The concrete implementation of `DocumentBackend`, over HTTP.
#[derive(Debug, Clone, Default)]
pub struct ReqwestBackend {
    client: Client,
}

impl ReqwestBackend {
    fn form(upload: &UploadRequest) -> Result<Form, BackendError> {
        let mut form = Form::new();
        for file in &upload.files {
            form = form.part("file", Self::file_part(file)?);
        }
        if let Some(chunk_size) = &upload.chunk_size {
            form = form.text("chunk_size", chunk_size.clone());
        }
        if let Some(chunk_overlap) = &upload.chunk_overlap {
            form = form.text("chunk_overlap", chunk_overlap.clone());
        }
        Ok(form)
    }

    fn file_part(file: &UploadedFile) -> Result<Part, BackendError> {
        let part = Self::content_part(file)?;
        let Some(content_type) = &file.content_type else {
            return Ok(part);
        };
        match part.mime_str(content_type) {
            Ok(part) => Ok(part),
            Err(e) => {
                debug!(content_type = %content_type, error = %e, "Forwarding file without its unparseable content type");
                Self::content_part(file)
            }
        }
    }

    fn content_part(file: &UploadedFile) -> Result<Part, BackendError> {
        let part = match &file.content {
            FileContent::Memory(bytes) => Part::stream_with_length(Body::from(bytes.clone()), bytes.len() as u64),
            FileContent::Disk { file: staged, len } => {
                let reader = staged.reopen().map_err(|source| BackendError::Staged {
                    file_name: file.file_name.clone(),
                    source,
                })?;
                let stream = ReaderStream::new(tokio::fs::File::from_std(reader));
                Part::stream_with_length(Body::wrap_stream(stream), *len)
            }
        };
        Ok(part.file_name(file.file_name.clone()))
    }
}

#[async_trait]
impl DocumentBackend for ReqwestBackend {
    #[instrument(skip_all, fields(endpoint = %endpoint, files = upload.files.len()))]
    async fn send(&self, endpoint: &Url, upload: &UploadRequest) -> Result<BackendReply, BackendError> {
        let form = Self::form(upload)?;

        let response = self.client.post(endpoint.clone()).multipart(form).send().await?;
        let status = response.status();
        debug!(status = %status, "Document backend responded");

        let bytes = response.bytes().await?;
        let body = serde_json::from_slice(&bytes).map_err(|source| {
            tracing::error!(status = %status, body = %String::from_utf8_lossy(&bytes), "Failed to parse backend response as JSON");
            BackendError::InvalidBody { status, source }
        })?;

        Ok(BackendReply { status, body })
    }
}
