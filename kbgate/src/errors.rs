use crate::backend::BackendError;
use crate::cid::CidError;
use crate::staging::StagingError;
use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use utoipa::ToSchema;

/// Message returned when a request arrives without any file attached.
pub const NO_FILE_UPLOADED: &str = "No file uploaded";

#[derive(ThisError, Debug)]
pub enum Error {
    /// Malformed or missing client input
    #[error("{message}")]
    Validation { message: String },

    /// Upload exceeds the configured body limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// Required configuration is missing; fatal to the request, not to the process
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The document backend was unreachable or answered with a body we could not parse
    #[error(transparent)]
    Upstream(#[from] BackendError),

    /// The backend succeeded but returned a content identifier that does not parse
    #[error("Invalid content identifier in `{field}`: {source}")]
    InvalidCid {
        field: &'static str,
        #[source]
        source: CidError,
    },

    /// Upload could not be staged before forwarding
    #[error(transparent)]
    Staging(#[from] StagingError),
}

/// JSON envelope used for every error produced by the gateway itself.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl Error {
    pub fn no_file_uploaded() -> Self {
        Error::Validation {
            message: NO_FILE_UPLOADED.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::InvalidCid { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Staging(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation { message } => message.clone(),
            Error::PayloadTooLarge { .. } => "Uploaded files exceed the maximum request size".to_string(),
            Error::Config { .. } => "Document backend endpoint is not configured".to_string(),
            Error::Upstream(_) => "Error processing the file with the document backend".to_string(),
            Error::InvalidCid { field, .. } => {
                format!("Document backend returned an invalid content identifier in `{field}`")
            }
            Error::Staging(_) => "Failed to store the uploaded file".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Validation { .. } | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Config { .. } => {
                tracing::error!("{}", self);
            }
            Error::Upstream(_) | Error::InvalidCid { .. } => {
                tracing::error!("Upstream error: {}", self.source_chain());
            }
            Error::Staging(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
        }

        let body = ErrorBody {
            error: self.user_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl Error {
    /// Flattened description including every `source()`, for logs only.
    fn source_chain(&self) -> String {
        let mut out = self.to_string();
        let mut source = StdError::source(self);
        while let Some(cause) = source {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

/// Type alias for gateway results
pub type Result<T> = std::result::Result<T, Error>;
