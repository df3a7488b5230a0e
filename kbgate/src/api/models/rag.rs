use crate::staging::FileContent;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One uploaded file, fully received.
#[derive(Debug)]
pub struct UploadedFile {
    /// Client-supplied file name, forwarded as-is and never used for local paths
    pub file_name: String,
    pub content_type: Option<String>,
    pub content: FileContent,
}

impl UploadedFile {
    pub fn in_memory(file_name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            content: FileContent::Memory(content.into()),
        }
    }
}

/// A document upload as relayed to the backend.
///
/// The chunking parameters are kept as the text the client sent; the backend validates them.
#[derive(Debug, Default)]
pub struct UploadRequest {
    pub files: Vec<UploadedFile>,
    pub chunk_size: Option<String>,
    pub chunk_overlap: Option<String>,
}

/// Multipart form accepted by `POST /api/process-rag`
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct ProcessRagForm {
    /// Documents to ingest (repeatable)
    #[schema(value_type = Vec<String>)]
    file: Vec<Vec<u8>>,
    /// Target chunk size, passed through to the backend
    #[schema(example = 1500)]
    chunk_size: Option<i64>,
    /// Overlap between consecutive chunks, passed through to the backend
    #[schema(example = 200)]
    chunk_overlap: Option<i64>,
}

/// Successful ingestion result.
///
/// Any additional fields returned by the backend are passed through unchanged.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProcessRagResponse {
    /// Identifier of the uploaded documents, as returned by the backend
    #[schema(example = "QmdfTbBqBPQ7VNxZEYEj14VmRuZBkqFbiwReogJgS1zR1n")]
    pub cid: Option<String>,
    /// Identifier of the built index, as returned by the backend
    pub index_cid: Option<String>,
    /// `cid` as CIDv1, base-32
    #[schema(example = "bafybeihdwdcefgh4dqkjv67uzcmw7ojee6xedzdetojuzjevtenxquvyku")]
    pub cid_v1: Option<String>,
    /// `index_cid` as CIDv1, base-32
    pub index_cid_v1: Option<String>,
    /// How many documents the backend indexed
    #[serde(rename = "number of documents", skip_serializing_if = "Option::is_none")]
    #[schema(example = 2)]
    pub number_of_documents: Option<u64>,
}
