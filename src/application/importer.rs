//! Restore service: size-aware batched import of an archive.
//!
//! Documents are visited in registry order, then nested lists, with one
//! running batch shared across all collections. A batch is committed as
//! soon as the next document would break its count or byte ceiling.
//! Oversized documents are skipped and logged; a failed commit stops the
//! run. Every write is an upsert by id, so re-running the same archive
//! after a failure is safe.

use std::mem;

use serde_json::{Map, Value};

use crate::domain::registry::{self, apply_rules, FieldRule};
use crate::domain::value::serialized_size;
use crate::domain::{Archive, Ceilings, ImportReport, Result, REGISTRY};
use crate::infrastructure::{CacheInvalidator, CollectionPath, DocumentStore, WriteOp};

use super::progress::ProgressReporter;
use super::sanitize::sanitize_document_for_import;

/// Write operations waiting for the next commit.
#[derive(Debug, Default)]
struct WriteBatch {
    ops: Vec<WriteOp>,
    bytes: usize,
}

impl WriteBatch {
    fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether one more document of `size` bytes stays within the ceilings.
    fn has_room(&self, size: usize, ceilings: &Ceilings) -> bool {
        self.ops.len() < ceilings.max_batch_writes
            && self.bytes + size <= ceilings.max_batch_bytes
    }

    fn push(&mut self, op: WriteOp, size: usize) {
        self.ops.push(op);
        self.bytes += size;
    }

    /// Hand over the queued operations and start empty.
    fn take(&mut self) -> (Vec<WriteOp>, usize) {
        let bytes = mem::take(&mut self.bytes);
        (mem::take(&mut self.ops), bytes)
    }
}

/// Mutable state of one import call.
struct ImportRun<'p> {
    report: ImportReport,
    batch: WriteBatch,
    processed: usize,
    total: usize,
    progress: Option<&'p dyn ProgressReporter>,
}

impl ImportRun<'_> {
    fn log(&mut self, line: impl Into<String>) {
        self.report.logs.push(line.into());
    }

    fn report_progress(&self, current: usize, status: &str) {
        if let Some(progress) = self.progress {
            progress.on_progress(current, self.total, status);
        }
    }
}

/// Where a list of archive documents is written to.
struct Target<'a> {
    collection: CollectionPath,
    label: &'a str,
    rules: &'a [FieldRule],
}

/// Service that restores archives into the document store.
pub struct RestoreService<'a, S: ?Sized> {
    store: &'a S,
    owner_id: String,
    ceilings: Ceilings,
}

impl<'a, S: DocumentStore + ?Sized> RestoreService<'a, S> {
    /// Create a restore service writing into `owner_id`'s collections.
    pub fn new(store: &'a S, owner_id: impl Into<String>, ceilings: Ceilings) -> Self {
        Self {
            store,
            owner_id: owner_id.into(),
            ceilings,
        }
    }

    /// Restore every document of `archive`, then invalidate the local cache.
    ///
    /// Never fails outright: a commit failure is reported through
    /// `success: false` and the log, with earlier batches left durable.
    pub async fn import_archive(
        &self,
        archive: &Archive,
        cache: &mut dyn CacheInvalidator,
        progress: Option<&dyn ProgressReporter>,
    ) -> ImportReport {
        let mut run = ImportRun {
            report: ImportReport::default(),
            batch: WriteBatch::default(),
            processed: 0,
            total: archive_total(archive),
            progress,
        };

        run.log(format!(
            "Starting restore of {} items into account {}",
            run.total, self.owner_id
        ));
        for key in archive
            .data
            .keys()
            .filter(|key| !registry::is_known_archive_key(key))
        {
            run.log(format!("Ignoring unknown collection '{key}'"));
        }

        if let Err(e) = self.write_all(archive, &mut run).await {
            tracing::error!(error = %e, "Restore aborted");
            run.log(format!("ERROR: batch commit failed: {e}"));
            run.log(format!(
                "Restore stopped after {} documents in {} batches; re-run the same import to finish.",
                run.report.documents_written, run.report.batches_committed
            ));
            run.report.success = false;
            return run.report;
        }

        run.report_progress(run.total, "Finalizing...");

        match cache.invalidate() {
            Ok(removed) => run.log(format!("Local cache cleared ({removed} entries)")),
            Err(e) => {
                tracing::warn!(error = %e, "Local cache could not be cleared");
                run.log(format!("WARNING: local cache could not be cleared: {e}"));
            }
        }

        run.log(format!(
            "Restore complete: {} documents written in {} batches, {} skipped",
            run.report.documents_written,
            run.report.batches_committed,
            run.report.documents_skipped
        ));

        tracing::info!(
            written = run.report.documents_written,
            batches = run.report.batches_committed,
            skipped = run.report.documents_skipped,
            "Restore completed"
        );

        run.report.success = true;
        run.report
    }

    async fn write_all(&self, archive: &Archive, run: &mut ImportRun<'_>) -> Result<()> {
        for spec in REGISTRY {
            let Some(items) = archive.collection(spec.name) else {
                continue;
            };
            let target = Target {
                collection: CollectionPath::for_owner(&self.owner_id, spec.name),
                label: spec.name,
                rules: spec.rules,
            };
            run.log(format!("Restoring {} ({} items)...", spec.name, items.len()));
            self.write_list(&target, items, run).await?;
        }

        for (parent, sub) in registry::nested_families() {
            let Some(parents) = archive.nested(sub.archive_key) else {
                continue;
            };
            let nested_total: usize = parents
                .values()
                .filter_map(Value::as_array)
                .map(Vec::len)
                .sum();
            run.log(format!(
                "Restoring {} ({nested_total} items across {} parents)...",
                sub.archive_key,
                parents.len()
            ));

            let parent_path = CollectionPath::for_owner(&self.owner_id, parent.name);
            for (parent_id, list) in parents {
                let Some(items) = list.as_array() else {
                    run.log(format!(
                        "SKIPPING {}/{parent_id}: expected a list of items",
                        sub.archive_key
                    ));
                    continue;
                };
                let target = Target {
                    collection: parent_path.subcollection(parent_id, sub.name),
                    label: sub.archive_key,
                    rules: sub.rules,
                };
                self.write_list(&target, items, run).await?;
            }
        }

        self.flush(run).await
    }

    async fn write_list(
        &self,
        target: &Target<'_>,
        items: &[Value],
        run: &mut ImportRun<'_>,
    ) -> Result<()> {
        for (index, item) in items.iter().enumerate() {
            let Some(document) = item.as_object() else {
                run.report.documents_skipped += 1;
                run.log(format!(
                    "SKIPPING {} item #{index}: not an object",
                    target.label
                ));
                continue;
            };
            let Some(id) = document_id(document) else {
                run.report.documents_skipped += 1;
                run.log(format!(
                    "SKIPPING {} item #{index}: missing 'id'",
                    target.label
                ));
                continue;
            };

            let mut document = document.clone();
            document.insert("id".to_string(), Value::String(id.clone()));
            apply_rules(target.rules, &id, &mut document);
            let data = sanitize_document_for_import(&document);

            let size = serialized_size(&data)?;
            if size > self.ceilings.max_document_bytes {
                run.report.documents_skipped += 1;
                tracing::warn!(
                    collection = target.label,
                    id = %id,
                    size,
                    "Skipping oversized document"
                );
                run.log(format!(
                    "SKIPPING {}/{id}: {size} bytes exceeds the {}-byte document limit",
                    target.label, self.ceilings.max_document_bytes
                ));
                continue;
            }

            if !run.batch.is_empty() && !run.batch.has_room(size, &self.ceilings) {
                self.flush(run).await?;
            }

            let path = target.collection.document(&id);
            run.batch.push(WriteOp::Set { path, data }, size);
            run.processed += 1;

            if run.processed % self.ceilings.progress_interval == 0 {
                run.report_progress(run.processed, &format!("Restoring {}...", target.label));
            }
        }
        Ok(())
    }

    async fn flush(&self, run: &mut ImportRun<'_>) -> Result<()> {
        if run.batch.is_empty() {
            return Ok(());
        }

        let count = run.batch.len();
        let (ops, bytes) = run.batch.take();
        let number = run.report.batches_committed + 1;

        self.store.commit(ops).await?;

        run.report.batches_committed = number;
        run.report.documents_written += count;
        tracing::debug!(batch = number, documents = count, bytes, "Batch committed");
        run.log(format!(
            "Committed batch {number} ({count} documents, {bytes} bytes)"
        ));
        Ok(())
    }
}

/// Documents a restore will visit, nested lists included.
fn archive_total(archive: &Archive) -> usize {
    let top: usize = REGISTRY
        .iter()
        .filter_map(|spec| archive.collection(spec.name))
        .map(Vec::len)
        .sum();
    let nested: usize = registry::nested_families()
        .filter_map(|(_, sub)| archive.nested(sub.archive_key))
        .flat_map(Map::values)
        .filter_map(Value::as_array)
        .map(Vec::len)
        .sum();
    top + nested
}

/// Document key: a non-empty string id, or a number rendered as text.
fn document_id(document: &Map<String, Value>) -> Option<String> {
    match document.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
