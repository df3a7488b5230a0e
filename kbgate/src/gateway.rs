//! The upload gateway: relay an upload to the document backend and normalize what comes back.
//!
//! The gateway is constructed once with its backend endpoint and shared (immutably) by every
//! request. Each call to [`UploadGateway::process`] makes exactly one backend call and holds no
//! state once it returns.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;

use crate::api::models::rag::UploadRequest;
use crate::backend::{BackendError, DocumentBackend, ReqwestBackend};
use crate::cid::{self, CidError};
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::staging::Stager;

/// Backend fields holding content identifiers, and the fields their normalized form goes to.
pub const CID_FIELDS: [(&str, &str); 2] = [("cid", "cid_v1"), ("index_cid", "index_cid_v1")];

/// Response produced by the gateway for a forwarded upload.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReply {
    pub status: StatusCode,
    pub body: Value,
}

impl IntoResponse for GatewayReply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Clone)]
pub struct UploadGateway {
    backend: Arc<dyn DocumentBackend>,
    endpoint: Option<Url>,
    stager: Stager,
}

impl UploadGateway {
    pub fn new(backend: Arc<dyn DocumentBackend>, endpoint: Option<Url>, stager: Stager) -> Self {
        Self {
            backend,
            endpoint,
            stager,
        }
    }

    /// Gateway talking HTTP to `backend.url`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(ReqwestBackend::default()),
            config.backend.url.clone(),
            Stager::new(&config.staging),
        )
    }

    /// The configured backend endpoint, or a configuration error if there is none.
    pub fn endpoint(&self) -> Result<&Url> {
        self.endpoint.as_ref().ok_or_else(|| Error::Config {
            message: "backend.url is not set (configure it or export API_ENDPOINT)".to_string(),
        })
    }

    pub fn stager(&self) -> &Stager {
        &self.stager
    }

    /// Forward `upload` and build the client-facing reply.
    ///
    /// Non-2xx backend answers are passed through untouched. Successful answers must be JSON
    /// objects; their `cid` and `index_cid` fields are normalized into `cid_v1` and
    /// `index_cid_v1`.
    #[instrument(skip_all, fields(files = upload.files.len()))]
    pub async fn process(&self, upload: &UploadRequest) -> Result<GatewayReply> {
        let endpoint = self.endpoint()?;
        if upload.files.is_empty() {
            return Err(Error::no_file_uploaded());
        }

        let reply = self.backend.send(endpoint, upload).await?;

        if !reply.status.is_success() {
            warn!(status = %reply.status, "Document backend rejected the upload, passing its answer through");
            return Ok(GatewayReply {
                status: reply.status,
                body: reply.body,
            });
        }

        let Value::Object(body) = reply.body else {
            return Err(BackendError::UnexpectedBody { status: reply.status }.into());
        };
        let body = normalize_response(body)?;
        info!(cid = ?body.get("cid_v1"), index_cid = ?body.get("index_cid_v1"), "Upload ingested");

        Ok(GatewayReply {
            status: StatusCode::OK,
            body: Value::Object(body),
        })
    }
}

/// Add the normalized identifier fields to a successful backend body.
///
/// An absent (or `null`) source field yields a `null` derived field. Anything else that is not
/// a valid identifier string fails the whole response.
pub fn normalize_response(mut body: Map<String, Value>) -> Result<Map<String, Value>> {
    for (field, derived) in CID_FIELDS {
        let normalized = match body.get(field) {
            None | Some(Value::Null) => Value::Null,
            Some(Value::String(text)) => {
                Value::String(cid::normalize(text).map_err(|source| Error::InvalidCid { field, source })?)
            }
            Some(_) => {
                return Err(Error::InvalidCid {
                    field,
                    source: CidError::NotAString,
                });
            }
        };
        body.insert(derived.to_string(), normalized);
    }
    Ok(body)
}
