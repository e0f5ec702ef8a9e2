//! Resumable blob ingestion engine.
//!
//! One run handles one chunked PATCH body under the edge environment's hard
//! limits: a ~2 minute wall clock, a 32-request outbound budget, and a
//! ~40 MiB heap. The engine streams part-sized buffers into the object
//! store's multipart protocol and checkpoints progress in the metadata KV
//! so that a later invocation — typically a fresh session created by the
//! client's retry loop — can pick up where this one stopped.
//!
//! Resumption rests on three rules:
//! - content identification by hashing the first megabyte, because the
//!   client-assigned session id churns on every retry;
//! - `list-parts` as the authority on progress, with the KV checkpoint
//!   treated as a cache;
//! - never seek: when the store already has bytes, report progress and let
//!   the client's next attempt carry the stream, instead of burning the
//!   invocation reading input it cannot cheaply discard.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::{info, warn};
use wharf_core::config::ServerConfig;
use wharf_core::{ContentFingerprint, MultipartCheckpoint};
use wharf_metadata::{CheckpointStore, CompletedUploadStore, MetadataError};
use wharf_storage::{ObjectStore, StorageError};

/// Boxed error for upload body streams.
pub type BodyError = Box<dyn std::error::Error + Send + Sync>;

/// Per-invocation sizing, configurable so tests can exercise the multipart
/// paths with small payloads.
#[derive(Clone, Copy, Debug)]
pub struct IngestLimits {
    pub part_size: usize,
    pub identify_window: usize,
    pub max_parts_per_invocation: usize,
}

impl IngestLimits {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            part_size: config.part_size,
            identify_window: config.identify_window,
            max_parts_per_invocation: config.max_parts_per_invocation,
        }
    }
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            part_size: wharf_core::PART_SIZE,
            identify_window: wharf_core::IDENTIFY_WINDOW,
            max_parts_per_invocation: wharf_core::MAX_PARTS_PER_INVOCATION,
        }
    }
}

/// Engine errors. Transport failures inside the part loop never surface
/// here; they become an incomplete [`IngestReport`] with state saved.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read upload body: {0}")]
    Body(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Progress report for one engine run.
#[derive(Debug)]
pub struct IngestReport {
    /// Bytes the object store now holds for this content (authoritative
    /// after a resume probe, cumulative otherwise).
    pub bytes_uploaded: u64,
    /// Whether the multipart assembly is finished. Distinct from
    /// client-facing finalization, which happens on PUT-complete.
    pub complete: bool,
    /// The assembled temp object's key, set when `complete` and any bytes
    /// exist (fresh assembly or completed-content early exit).
    pub assembled_key: Option<String>,
    /// The in-flight checkpoint, set when `complete` is false.
    pub checkpoint: Option<MultipartCheckpoint>,
}

impl IngestReport {
    fn complete_empty() -> Self {
        Self { bytes_uploaded: 0, complete: true, assembled_key: None, checkpoint: None }
    }

    /// Whether this run exited early because the content was already
    /// assembled in a previous session.
    pub fn is_early_exit(&self) -> bool {
        self.complete && self.bytes_uploaded == 0 && self.assembled_key.is_some()
    }
}

/// The ingestion engine. Borrowed per request; all state is external.
pub struct IngestionEngine<'a> {
    pub objects: &'a dyn ObjectStore,
    pub checkpoints: &'a CheckpointStore,
    pub completed: &'a CompletedUploadStore,
    pub limits: IngestLimits,
}

impl<'a> IngestionEngine<'a> {
    /// Run one chunked-upload invocation.
    ///
    /// `key` is the session's temp data key; a matching checkpoint
    /// overrides it with the key the assembly started under.
    pub async fn run<S>(
        &self,
        repo: &str,
        key: &str,
        body: S,
    ) -> Result<IngestReport, IngestError>
    where
        S: Stream<Item = Result<Bytes, BodyError>> + Unpin + Send,
    {
        let mut reader = BodyReader::new(body);

        // Identify the content by its first window.
        let mut buf = Vec::with_capacity(self.limits.part_size);
        reader
            .read_up_to(&mut buf, self.limits.identify_window)
            .await
            .map_err(IngestError::Body)?;
        if buf.is_empty() {
            return Ok(IngestReport::complete_empty());
        }

        let fingerprint = ContentFingerprint::from_window(&buf);
        let checkpoint_key = fingerprint.checkpoint_key(repo);
        info!(%fingerprint, %checkpoint_key, identify_len = buf.len(), "identified upload content");

        // Early exit: the content may already be fully assembled. The
        // record is only trusted after a HEAD confirms the object exists.
        match self.completed.load(&checkpoint_key).await {
            Ok(Some(completed_key)) => {
                if matches!(self.objects.exists(&completed_key).await, Ok(true)) {
                    info!(%completed_key, "content already assembled, early exit");
                    return Ok(IngestReport {
                        bytes_uploaded: 0,
                        complete: true,
                        assembled_key: Some(completed_key),
                        checkpoint: None,
                    });
                }
                info!(%checkpoint_key, %completed_key, "purging stale completed-content record");
                self.delete_completed(&checkpoint_key).await;
            }
            Ok(None) => {}
            Err(e) => warn!(%checkpoint_key, error = %e, "completed-content lookup failed"),
        }

        // Resume probe: reconcile any checkpoint against list-parts.
        let mut key = key.to_string();
        let mut resumed: Option<MultipartCheckpoint> = None;

        match self.checkpoints.load(&checkpoint_key).await {
            Ok(Some(existing)) if existing.content_fingerprint == fingerprint.as_str() => {
                // Resume against the original assembly key, not the new
                // session's.
                key = existing.key.clone();
                match self.objects.list_parts(&key, &existing.upload_id).await {
                    Ok(parts) => {
                        let mut checkpoint = existing;
                        checkpoint.completed_parts = parts
                            .iter()
                            .map(|p| wharf_core::CompletedPart {
                                part_number: p.part_number,
                                etag: p.etag.clone(),
                            })
                            .collect();
                        checkpoint.bytes_uploaded = parts.iter().map(|p| p.size).sum();
                        if let Some(last) = parts.last() {
                            checkpoint.next_part_number = last.part_number + 1;
                        }

                        if checkpoint.bytes_uploaded > 0 {
                            // The store already has data and this body starts
                            // at byte zero. Seeking through megabytes of
                            // already-uploaded input would eat the whole
                            // invocation, so report authoritative progress
                            // and let the client's retry drive convergence.
                            info!(
                                bytes = checkpoint.bytes_uploaded,
                                parts = checkpoint.completed_parts.len(),
                                next_part = checkpoint.next_part_number,
                                "resume probe found progress, returning without uploading"
                            );
                            self.persist(&checkpoint_key, &checkpoint).await;
                            return Ok(IngestReport {
                                bytes_uploaded: checkpoint.bytes_uploaded,
                                complete: false,
                                assembled_key: None,
                                checkpoint: Some(checkpoint),
                            });
                        }

                        // Upload exists but holds nothing yet; reuse it.
                        resumed = Some(checkpoint);
                    }
                    Err(e) => {
                        info!(error = %e, "list-parts failed, discarding checkpoint and starting fresh");
                        if let Err(e) = self.checkpoints.delete(&checkpoint_key).await {
                            warn!(%checkpoint_key, error = %e, "checkpoint delete failed");
                        }
                    }
                }
            }
            Ok(Some(_)) | Ok(None) => {}
            Err(e) => warn!(%checkpoint_key, error = %e, "checkpoint lookup failed"),
        }

        // Initiate a fresh upload unless one was resumed.
        let mut checkpoint = match resumed {
            Some(checkpoint) => checkpoint,
            None => {
                let upload_id = self.objects.initiate_multipart(&key).await?;
                info!(%upload_id, %key, "initiated multipart upload");
                MultipartCheckpoint::new(upload_id, key.clone(), fingerprint.as_str())
            }
        };

        // First part: the identification buffer plus enough of the stream
        // to fill one part.
        if let Err(e) = reader.read_up_to(&mut buf, self.limits.part_size).await {
            // The checkpoint carries the upload id even with no parts yet.
            self.persist(&checkpoint_key, &checkpoint).await;
            return Err(IngestError::Body(e));
        }

        let mut parts_this_invocation = 0;
        match self.upload_one_part(&mut checkpoint, Bytes::from(std::mem::take(&mut buf))).await {
            PartOutcome::Uploaded => parts_this_invocation += 1,
            PartOutcome::BudgetExhausted => {
                self.persist(&checkpoint_key, &checkpoint).await;
                return Ok(self.incomplete(checkpoint));
            }
            PartOutcome::Failed(e) => {
                self.persist(&checkpoint_key, &checkpoint).await;
                return Err(e.into());
            }
        }

        // Main loop: full parts until the stream dries up or the
        // invocation's part budget is spent.
        while parts_this_invocation < self.limits.max_parts_per_invocation {
            buf.clear();
            if let Err(e) = reader.read_up_to(&mut buf, self.limits.part_size).await {
                self.persist(&checkpoint_key, &checkpoint).await;
                return Err(IngestError::Body(e));
            }
            if buf.is_empty() {
                break;
            }

            match self.upload_one_part(&mut checkpoint, Bytes::from(std::mem::take(&mut buf))).await {
                PartOutcome::Uploaded => parts_this_invocation += 1,
                PartOutcome::BudgetExhausted => {
                    self.persist(&checkpoint_key, &checkpoint).await;
                    return Ok(self.incomplete(checkpoint));
                }
                PartOutcome::Failed(e) => {
                    self.persist(&checkpoint_key, &checkpoint).await;
                    return Err(e.into());
                }
            }
        }

        // Tail probe: any remaining byte (or a dirty end) means another
        // invocation must finish the job.
        if reader.has_more().await {
            info!(
                parts = checkpoint.completed_parts.len(),
                bytes = checkpoint.bytes_uploaded,
                "stream continues past this invocation's budget, saving state"
            );
            self.persist(&checkpoint_key, &checkpoint).await;
            return Ok(self.incomplete(checkpoint));
        }

        // Nothing was ever written: drop the store-side upload too.
        if checkpoint.completed_parts.is_empty() {
            if let Err(e) = self.objects.abort_multipart(&key, &checkpoint.upload_id).await {
                warn!(error = %e, "abort of empty multipart upload failed");
            }
            if let Err(e) = self.checkpoints.delete(&checkpoint_key).await {
                warn!(%checkpoint_key, error = %e, "checkpoint delete failed");
            }
            return Ok(IngestReport::complete_empty());
        }

        // Assembly complete.
        let parts = checkpoint.sorted_parts();
        self.objects
            .complete_multipart(&key, &checkpoint.upload_id, &parts)
            .await?;

        if let Err(e) = self.checkpoints.delete(&checkpoint_key).await {
            warn!(%checkpoint_key, error = %e, "checkpoint delete failed");
        }
        if let Err(e) = self.completed.save(&checkpoint_key, &key).await {
            warn!(%checkpoint_key, error = %e, "completed-content record save failed");
        }

        info!(
            bytes = checkpoint.bytes_uploaded,
            parts = parts.len(),
            %key,
            "multipart assembly complete"
        );
        Ok(IngestReport {
            bytes_uploaded: checkpoint.bytes_uploaded,
            complete: true,
            assembled_key: Some(key),
            checkpoint: None,
        })
    }

    async fn upload_one_part(
        &self,
        checkpoint: &mut MultipartCheckpoint,
        data: Bytes,
    ) -> PartOutcome {
        let part_number = checkpoint.next_part_number;
        let size = data.len() as u64;

        match self
            .objects
            .upload_part(&checkpoint.key, &checkpoint.upload_id, part_number, data)
            .await
        {
            Ok(etag) => {
                info!(part_number, size, %etag, "uploaded part");
                checkpoint.record_part(part_number, etag, size);
                PartOutcome::Uploaded
            }
            // The environment surfaces an exhausted backend-request budget
            // as a request error, so a transport failure here means "stop
            // and let the next invocation continue".
            Err(e) if e.is_transport() => {
                info!(part_number, error = %e, "part upload hit the backend budget, saving state");
                PartOutcome::BudgetExhausted
            }
            Err(e) => PartOutcome::Failed(e),
        }
    }

    fn incomplete(&self, checkpoint: MultipartCheckpoint) -> IngestReport {
        IngestReport {
            bytes_uploaded: checkpoint.bytes_uploaded,
            complete: false,
            assembled_key: None,
            checkpoint: Some(checkpoint),
        }
    }

    /// Best-effort checkpoint persist on loop exit paths.
    async fn persist(&self, checkpoint_key: &str, checkpoint: &MultipartCheckpoint) {
        if let Err(e) = self.checkpoints.save(checkpoint_key, checkpoint).await {
            warn!(checkpoint_key, error = %e, "checkpoint persist failed");
        }
    }

    async fn delete_completed(&self, checkpoint_key: &str) {
        if let Err(e) = self.completed.delete(checkpoint_key).await {
            warn!(checkpoint_key, error = %e, "stale completed-content delete failed");
        }
    }
}

enum PartOutcome {
    Uploaded,
    BudgetExhausted,
    Failed(StorageError),
}

/// Buffers a body stream into exact-sized reads.
struct BodyReader<S> {
    stream: S,
    pending: Bytes,
    done: bool,
}

impl<S> BodyReader<S>
where
    S: Stream<Item = Result<Bytes, BodyError>> + Unpin + Send,
{
    fn new(stream: S) -> Self {
        Self { stream, pending: Bytes::new(), done: false }
    }

    /// Append stream data to `buf` until it holds `target` bytes or the
    /// stream ends.
    async fn read_up_to(&mut self, buf: &mut Vec<u8>, target: usize) -> Result<(), String> {
        while buf.len() < target {
            if !self.pending.is_empty() {
                let take = (target - buf.len()).min(self.pending.len());
                buf.extend_from_slice(&self.pending.split_to(take));
                continue;
            }
            if self.done {
                break;
            }
            match self.stream.next().await {
                Some(Ok(chunk)) => self.pending = chunk,
                Some(Err(e)) => return Err(e.to_string()),
                None => self.done = true,
            }
        }
        Ok(())
    }

    /// Probe for any byte past the current position. A read error counts as
    /// "more": the invocation cannot call the stream finished. The probed
    /// byte is consumed; the client's retry re-sends it.
    async fn has_more(&mut self) -> bool {
        if !self.pending.is_empty() {
            return true;
        }
        if self.done {
            return false;
        }
        loop {
            match self.stream.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(_)) => return true,
                Some(Err(_)) => return true,
                None => {
                    self.done = true;
                    return false;
                }
            }
        }
    }
}
