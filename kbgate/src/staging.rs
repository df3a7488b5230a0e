//! Transient storage for uploads between the inbound and outbound multipart bodies.
//!
//! Every uploaded file is fully received before anything is sent to the backend. Depending on
//! [`StagingMode`] the bytes are buffered in memory or written to a temporary file. Temporary
//! files are named after the request id (never after the client-supplied file name) and are
//! removed when the owning [`FileContent`] is dropped, whichever way the request ends.

use bytes::{Bytes, BytesMut};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::config::{StagingConfig, StagingMode};

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("failed to create staging file in {}: {source}", dir.display())]
    Create {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write staged upload: {0}")]
    Write(#[source] std::io::Error),
}

/// Creates per-request sinks according to the configured staging mode.
#[derive(Debug, Clone)]
pub struct Stager {
    mode: StagingMode,
    dir: PathBuf,
}

impl Stager {
    pub fn new(config: &StagingConfig) -> Self {
        Self {
            mode: config.mode,
            dir: config.dir.clone().unwrap_or_else(std::env::temp_dir),
        }
    }

    /// Open a sink for one file of the request identified by `request_id`.
    pub fn open(&self, request_id: Uuid) -> Result<FileSink, StagingError> {
        match self.mode {
            StagingMode::Memory => Ok(FileSink::Memory(BytesMut::new())),
            StagingMode::Disk => {
                let file = tempfile::Builder::new()
                    .prefix(&format!("kbgate-{request_id}-"))
                    .suffix(".upload")
                    .tempfile_in(&self.dir)
                    .map_err(|source| StagingError::Create {
                        dir: self.dir.clone(),
                        source,
                    })?;
                let writer = file.reopen().map_err(StagingError::Write)?;
                debug!(path = %file.path().display(), "Staging upload on disk");
                Ok(FileSink::Disk {
                    file,
                    writer: tokio::fs::File::from_std(writer),
                    len: 0,
                })
            }
        }
    }
}

/// Receives the chunks of one uploaded file.
pub enum FileSink {
    Memory(BytesMut),
    Disk {
        file: NamedTempFile,
        writer: tokio::fs::File,
        len: u64,
    },
}

impl FileSink {
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), StagingError> {
        match self {
            FileSink::Memory(buf) => buf.extend_from_slice(chunk),
            FileSink::Disk { writer, len, .. } => {
                writer.write_all(chunk).await.map_err(StagingError::Write)?;
                *len += chunk.len() as u64;
            }
        }
        Ok(())
    }

    pub async fn finish(self) -> Result<FileContent, StagingError> {
        match self {
            FileSink::Memory(buf) => Ok(FileContent::Memory(buf.freeze())),
            FileSink::Disk { file, mut writer, len } => {
                writer.flush().await.map_err(StagingError::Write)?;
                Ok(FileContent::Disk { file, len })
            }
        }
    }
}

/// A fully received file. Dropping a `Disk` value deletes the temporary file.
#[derive(Debug)]
pub enum FileContent {
    Memory(Bytes),
    Disk { file: NamedTempFile, len: u64 },
}

impl FileContent {
    pub fn len(&self) -> u64 {
        match self {
            FileContent::Memory(bytes) => bytes.len() as u64,
            FileContent::Disk { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            FileContent::Memory(_) => None,
            FileContent::Disk { file, .. } => Some(file.path()),
        }
    }
}
