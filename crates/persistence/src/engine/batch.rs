//! The batch retrieval loop.
//!
//! Keys are de-duplicated and split into chunks of at most
//! `max_batch_size`. Chunks are fetched in order, one multi-get at a time.
//! Keys the backend leaves unprocessed are resubmitted after a backoff until
//! none remain. A round that processes nothing counts against
//! `max_unprocessed_retries`; any progress resets the count.

use std::collections::HashSet;

use serde_json::Value;

use crate::config::BatchConfig;
use crate::core::RecordStore;
use crate::error::{BackendError, DalError, DalResult};
use crate::tenant::TenantContext;
use crate::types::Record;

/// Fetches records by primary key through a store's multi-get.
pub struct BatchFetcher<'a> {
    store: &'a dyn RecordStore,
    config: &'a BatchConfig,
    debug_logging: bool,
}

impl<'a> BatchFetcher<'a> {
    /// Creates a fetcher.
    pub fn new(store: &'a dyn RecordStore, config: &'a BatchConfig) -> Self {
        Self {
            store,
            config,
            debug_logging: false,
        }
    }

    /// Emits a debug event per multi-get call.
    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    /// Fetches the records addressed by `keys`. Missing records are omitted.
    ///
    /// # Errors
    ///
    /// A failed multi-get, cancellation, or exhausting the retry budget ends
    /// the loop. Records fetched before that are returned; the error
    /// propagates only when there are none.
    pub async fn fetch(&self, ctx: &TenantContext, table_name: &str, keys: &[Record]) -> DalResult<Vec<Record>> {
        let unique = dedupe(keys);
        let chunk_size = self.config.max_batch_size.max(1);
        let mut found = Vec::with_capacity(unique.len());

        for chunk in unique.chunks(chunk_size) {
            if let Err(e) = self.fetch_chunk(ctx, table_name, chunk, &mut found).await {
                return partial_or(found, e);
            }
        }
        Ok(found)
    }

    async fn fetch_chunk(
        &self,
        ctx: &TenantContext,
        table_name: &str,
        chunk: &[Record],
        found: &mut Vec<Record>,
    ) -> DalResult<()> {
        let mut pending = chunk.to_vec();
        let mut stalled = 0u32;
        let mut round = 0u32;

        while !pending.is_empty() {
            if ctx.is_cancelled() {
                return Err(DalError::Cancelled);
            }

            let output = self.store.multi_get(table_name, &pending).await?;
            let progressed = output.unprocessed_keys.len() < pending.len();
            if self.debug_logging {
                tracing::debug!(
                    table = table_name,
                    requested = pending.len(),
                    returned = output.items.len(),
                    unprocessed = output.unprocessed_keys.len(),
                    "Multi-get call"
                );
            }
            found.extend(output.items);
            pending = output.unprocessed_keys;
            if pending.is_empty() {
                break;
            }

            stalled = if progressed { 0 } else { stalled + 1 };
            if stalled > self.config.max_unprocessed_retries {
                return Err(BackendError::transient(
                    self.store.backend_name(),
                    format!(
                        "{} keys still unprocessed after {} retries without progress",
                        pending.len(),
                        self.config.max_unprocessed_retries
                    ),
                )
                .into());
            }

            round += 1;
            let delay = self.config.backoff(round);
            tracing::warn!(
                table = table_name,
                unprocessed = pending.len(),
                delay = %humantime::format_duration(delay),
                "Resubmitting unprocessed keys"
            );
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

fn dedupe(keys: &[Record]) -> Vec<Record> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter()
        .filter(|key| seen.insert(Value::Object((*key).clone()).to_string()))
        .cloned()
        .collect()
}

fn partial_or(found: Vec<Record>, error: DalError) -> DalResult<Vec<Record>> {
    if found.is_empty() {
        Err(error)
    } else {
        tracing::warn!(error = %error, returned = found.len(), "Returning partial batch result");
        Ok(found)
    }
}
