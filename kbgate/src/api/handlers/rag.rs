use crate::AppState;
use crate::api::models::rag::{ProcessRagForm, ProcessRagResponse, UploadRequest, UploadedFile};
use crate::errors::{Error, ErrorBody, Result};
use crate::gateway::GatewayReply;
use crate::staging::Stager;
use axum::{
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use tracing::{Span, debug, instrument};
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/api/process-rag",
    tag = "ingestion",
    summary = "Ingest documents",
    description = "Upload one or more documents to be chunked and indexed by the document backend. \
        Content identifiers in a successful answer are also returned as CIDv1 (base-32) in `cid_v1` \
        and `index_cid_v1`. Backend error answers are passed through with their original status.",
    request_body(
        content = ProcessRagForm,
        content_type = "multipart/form-data",
        description = "Files plus chunking parameters"
    ),
    responses(
        (status = 200, description = "Documents ingested", body = ProcessRagResponse),
        (status = 400, description = "No file uploaded or malformed form", body = ErrorBody),
        (status = 413, description = "Payload too large", body = ErrorBody),
        (status = 500, description = "Backend unreachable, misconfigured, or returned an invalid identifier", body = ErrorBody)
    )
)]
#[instrument(skip_all, fields(request_id = tracing::field::Empty))]
pub async fn process_rag(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<GatewayReply> {
    // Nothing is read from the request before we know where it would go
    state.gateway.endpoint()?;

    let request_id = Uuid::new_v4();
    Span::current().record("request_id", tracing::field::display(request_id));

    let mut multipart = multipart.map_err(|rejection| {
        debug!(%rejection, "Upload is not a multipart request");
        Error::no_file_uploaded()
    })?;

    let upload = read_upload(&mut multipart, state.gateway.stager(), request_id).await?;

    // Staged files are removed when `upload` drops, after the backend has answered
    state.gateway.process(&upload).await
}

/// Receive every field of the form, staging file contents as they stream in.
async fn read_upload(multipart: &mut Multipart, stager: &Stager, request_id: Uuid) -> Result<UploadRequest> {
    let mut upload = UploadRequest::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().map(str::to_string);

                let mut sink = stager.open(request_id)?;
                let mut chunks = 0usize;
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    chunks += 1;
                    sink.write(&chunk).await?;
                }
                let content = sink.finish().await?;

                // Browsers send an empty, unnamed part when no file was picked
                if file_name.is_empty() && content.is_empty() {
                    debug!("Skipping empty file field");
                    continue;
                }

                debug!(
                    file_name = %file_name,
                    bytes = content.len(),
                    chunks,
                    staged_on_disk = content.path().is_some(),
                    "Received file"
                );
                upload.files.push(UploadedFile {
                    file_name,
                    content_type,
                    content,
                });
            }
            "chunk_size" => {
                upload.chunk_size = Some(field.text().await.map_err(multipart_error)?);
            }
            "chunk_overlap" => {
                upload.chunk_overlap = Some(field.text().await.map_err(multipart_error)?);
            }
            other => {
                debug!(field = other, "Ignoring unknown form field");
            }
        }
    }

    if upload.files.is_empty() {
        return Err(Error::no_file_uploaded());
    }

    Ok(upload)
}

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { message: e.body_text() }
    } else {
        Error::Validation {
            message: format!("Failed to parse multipart data: {}", e.body_text()),
        }
    }
}
