//! Chunked file and directory delivery over the command channel.
//!
//! A transfer is a sequence of correlated `file_upload_chunk` commands
//! with at most one chunk in flight; a failed round trip aborts the
//! remainder. The agent appends chunks to a temp file and finalises it on
//! the last index, which makes the last acknowledgement the transfer's
//! result.

use std::{path::Path, time::Duration};

use agent_control_core::{
    AgentCommand, AgentReply,
    chunk::{self, Chunk},
};
use bytes::Bytes;
use thiserror::Error;

use crate::{
    archive::{self, ArchiveError},
    dispatch::{DispatchError, Dispatcher},
};

/// Result of a completed transfer.
#[derive(Debug)]
pub struct TransferOutcome {
    pub chunks_sent: usize,
    pub total_chunks: usize,
    /// Acknowledgement of the final chunk.
    pub reply: AgentReply,
}

/// Why a transfer did not complete.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A chunk round trip failed; the rest of the transfer was abandoned.
    /// No automatic resume.
    #[error("transfer aborted after {sent}/{total} chunks: {cause}")]
    Aborted {
        sent: usize,
        total: usize,
        #[source]
        cause: DispatchError,
    },
    /// The agent acknowledged a chunk with an error status.
    #[error("agent rejected chunk {index}/{total}")]
    Rejected { index: usize, total: usize },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl Dispatcher {
    /// Deliver a file payload as an ordered sequence of acknowledged
    /// chunks.
    ///
    /// At most one chunk is outstanding at a time; each acknowledgement
    /// gates the next send. An empty payload still produces one empty
    /// chunk so the agent materialises the file.
    ///
    /// # Errors
    /// Aborts on the first failed round trip, reporting how many chunks
    /// were delivered, or on an error-status acknowledgement.
    pub async fn send_file(
        &self,
        agent_id: &str,
        target_path: &str,
        filename: &str,
        payload: Bytes,
        chunk_size: usize,
        timeout: Duration,
    ) -> Result<TransferOutcome, TransferError> {
        let mut chunks = chunk::split(&payload, chunk_size);
        if chunks.is_empty() {
            chunks.push(Chunk {
                index: 0,
                total: 1,
                data: String::new(),
            });
        }
        let total = chunks.len();

        let mut delivered = 0;
        let mut reply = AgentReply::Text(String::new());
        for piece in &chunks {
            let command = AgentCommand::FileUploadChunk {
                target_path: target_path.to_owned(),
                filename: filename.to_owned(),
                chunk_index: piece.index,
                total_chunks: piece.total,
                data: piece.data.clone(),
            };
            reply = self
                .dispatch(agent_id, &command.to_json(), timeout)
                .await
                .map_err(|cause| TransferError::Aborted {
                    sent: delivered,
                    total,
                    cause,
                })?;
            if reply.status() == Some("error") {
                return Err(TransferError::Rejected {
                    index: piece.index,
                    total,
                });
            }
            delivered += 1;
        }

        tracing::info!("agent {agent_id}: delivered {filename} in {total} chunks");
        Ok(TransferOutcome {
            chunks_sent: delivered,
            total_chunks: total,
            reply,
        })
    }

    /// Pack a directory and deliver the archive through the chunk
    /// protocol.
    ///
    /// The archive is named after the directory's base name with a `.zip`
    /// extension; agents extract such uploads in place.
    ///
    /// # Errors
    /// Fails when the directory cannot be packed, or as
    /// [`Dispatcher::send_file`] does.
    pub async fn send_dir(
        &self,
        agent_id: &str,
        target_path: &str,
        dir: &Path,
        chunk_size: usize,
        timeout: Duration,
    ) -> Result<TransferOutcome, TransferError> {
        let packed = archive::pack_dir(dir)?;
        let base = dir.file_name().map_or_else(
            || "archive".to_owned(),
            |name| name.to_string_lossy().into_owned(),
        );
        let filename = format!("{base}.zip");
        self.send_file(
            agent_id,
            target_path,
            &filename,
            Bytes::from(packed),
            chunk_size,
            timeout,
        )
        .await
    }
}
