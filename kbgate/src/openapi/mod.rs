//! OpenAPI documentation for the gateway.
//!
//! Served as JSON at `/api-docs/openapi.json` and rendered with Scalar at `/docs`.

use utoipa::OpenApi;

use crate::api;
use crate::errors::ErrorBody;

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "health",
    summary = "Health check",
    description = "Returns `OK` while the process is serving requests. Does not contact the document backend.",
    responses(
        (status = 200, description = "Service is up", body = String, content_type = "text/plain"),
    )
)]
#[allow(unused)]
fn healthz() {}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "kbgate",
        description = "Knowledge-base ingestion gateway. Relays document uploads to the document backend \
            and returns its content identifiers in CIDv1 form."
    ),
    paths(healthz, api::handlers::rag::process_rag),
    components(schemas(
        api::models::rag::ProcessRagForm,
        api::models::rag::ProcessRagResponse,
        ErrorBody
    )),
    tags(
        (name = "ingestion", description = "Document upload and indexing"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;
