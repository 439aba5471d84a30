//! Batch importer.
//!
//! Streams a JSONL file line-by-line (never loading it whole), embeds and
//! upserts in fixed-size batches, reports progress through a pluggable
//! observer, and always cleans up the temp file — even on error.

use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::debug_log;
use crate::embedding::Embedder;
use crate::error::{HtmError, Result};
use crate::store::{Predicate, StoredRow, VectorStore};

use super::progress::ImportProgress;
use super::PendingEntry;

/// Stream `jsonl_path` into `store` in batches of `batch_size`, embedding
/// each `pureText` along the way. `total_entries` comes from the ingestor's
/// [`super::IngestOutput`] and only drives progress reporting.
pub async fn run_import(
    jsonl_path: &Path,
    total_entries: usize,
    batch_size: usize,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    progress: &dyn ImportProgress,
) -> Result<usize> {
    progress.started(total_entries);
    let result = stream_batches(jsonl_path, batch_size, embedder, store, progress).await;
    // Cleanup runs even when streaming fails partway through.
    if let Err(e) = std::fs::remove_file(jsonl_path) {
        debug_log!("[hybridtm] failed to remove temp file {}: {e}", jsonl_path.display());
    }
    let processed = result?;
    progress.finished(processed);
    Ok(processed)
}

async fn stream_batches(
    jsonl_path: &Path,
    batch_size: usize,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    progress: &dyn ImportProgress,
) -> Result<usize> {
    let file = std::fs::File::open(jsonl_path)?;
    let reader = BufReader::new(file);

    let mut batch: Vec<PendingEntry> = Vec::with_capacity(batch_size);
    let mut processed = 0usize;

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PendingEntry>(&line) {
            Ok(entry) => batch.push(entry),
            Err(e) => {
                debug_log!(
                    "[hybridtm] skipping malformed JSONL line {} in {}: {e}",
                    line_number + 1,
                    jsonl_path.display()
                );
                continue;
            }
        }

        if batch.len() >= batch_size {
            processed += commit_batch(std::mem::take(&mut batch), embedder, store).await?;
            progress.batch_committed(processed, processed);
        }
    }

    if !batch.is_empty() {
        processed += commit_batch(batch, embedder, store).await?;
        progress.batch_committed(processed, processed);
    }

    Ok(processed)
}

async fn commit_batch(entries: Vec<PendingEntry>, embedder: &dyn Embedder, store: &dyn VectorStore) -> Result<usize> {
    let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();

    let rows = embed_entries(&entries, embedder).or_else(|_| embed_entries(&entries, embedder))?;

    store.delete_where(Predicate::IdIn(ids)).await?;
    let count = rows.len();
    store.upsert_batch(rows).await?;
    Ok(count)
}

fn embed_entries(entries: &[PendingEntry], embedder: &dyn Embedder) -> Result<Vec<StoredRow>> {
    entries
        .iter()
        .map(|entry| {
            let vector = embedder
                .embed(&entry.pure_text)
                .map_err(|_| HtmError::ModelUnavailable(entry.id.clone()))?;
            let full = entry.clone().into_entry(vector);
            Ok(StoredRow::from_entry(&full))
        })
        .collect()
}
