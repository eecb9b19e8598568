//! CPE dictionary import and refresh.
//!
//! Both operations page through the NVD listing one request at a time, write
//! every page to the store, and leave exactly one import log per attempt. The
//! log is moved to SUCCESS or FAILED before control returns; on failure the
//! error is returned after the FAILED row is written.

mod normalize;

pub use normalize::{nested_cpe, normalize};

use anyhow::{Context, Result};
use cpe_store::{Db, ImportLog, ImportOperation, ImportStatus, WriteOutcome};
use ingest_core::Source;
use nvd_client::{ClientError, NvdClient, Page};
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Where pages of raw products come from.
#[allow(async_fn_in_trait)]
pub trait EntrySource {
    async fn fetch_entries(&mut self, start_index: usize, page_size: usize) -> Result<Page, ClientError>;
}

impl EntrySource for NvdClient {
    async fn fetch_entries(&mut self, start_index: usize, page_size: usize) -> Result<Page, ClientError> {
        NvdClient::fetch_entries(self, start_index, page_size).await
    }
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub batch_size: usize,
    /// Incremental updates stop once the offset reaches this value.
    pub incremental_offset_cap: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig { batch_size: 2000, incremental_offset_cap: 10_000 }
    }
}

pub struct CpeImporter<S> {
    source: S,
    db: Db,
    config: ImportConfig,
}

impl<S: EntrySource> CpeImporter<S> {
    pub fn new(source: S, db: Db, config: ImportConfig) -> Self {
        CpeImporter { source, db, config }
    }

    pub fn db(&self) -> &Db { &self.db }

    pub fn source(&self) -> &S { &self.source }

    pub fn into_parts(self) -> (S, Db) { (self.source, self.db) }

    /// Import the whole dictionary. Rows that already exist are left as they are.
    pub async fn full_import(&mut self) -> Result<ImportLog> {
        info!("starting full CPE import");
        self.run(ImportOperation::FullImport, None).await
    }

    /// Refresh stored rows from the head of the listing, overwriting existing
    /// ones. The scan stops at `incremental_offset_cap`.
    ///
    /// `lookback_days` is recorded in the log output only. The CPE listing is
    /// always read from offset 0.
    pub async fn incremental_update(&mut self, lookback_days: u32) -> Result<ImportLog> {
        info!(lookback_days, "starting incremental CPE update");
        let cap = self.config.incremental_offset_cap;
        self.run(ImportOperation::Incremental, Some(cap)).await
    }

    async fn run(&mut self, operation: ImportOperation, offset_cap: Option<usize>) -> Result<ImportLog> {
        let log_id = self.db.begin_import(Source::Cpe, operation)?;
        let upsert = operation == ImportOperation::Incremental;
        let mut processed = 0usize;

        match self.paginate(upsert, offset_cap, &mut processed).await {
            Ok(()) => {
                if let Err(e) = self.db.finish_import(log_id, ImportStatus::Success, processed as i64, "") {
                    error!(%operation, processed, error = %e, log_id, "could not record successful import");
                    return Err(e.context(format!("recording result of import {log_id}")));
                }
                info!(%operation, processed, "CPE import completed");
            }
            Err(e) => {
                let message = format!("{e:#}");
                error!(%operation, processed, error = %message, "CPE import failed");
                if let Err(log_err) = self.db.finish_import(log_id, ImportStatus::Failed, processed as i64, &message) {
                    error!(error = %log_err, log_id, "could not record failed import");
                }
                return Err(e);
            }
        }

        self.db.import_log(log_id)?.with_context(|| format!("import log {log_id} disappeared"))
    }

    async fn paginate(&mut self, upsert: bool, offset_cap: Option<usize>, processed: &mut usize) -> Result<()> {
        let mut start_index = 0usize;
        loop {
            info!(start_index, "fetching CPE batch");
            let page = self
                .source
                .fetch_entries(start_index, self.config.batch_size)
                .await
                .with_context(|| format!("fetching CPE batch at index {start_index}"))?;
            let total = page.total_results;
            let entries = page.into_entries();
            if entries.is_empty() {
                info!("no more CPE data to process");
                break;
            }

            let done = self.process_batch(&entries, upsert);
            *processed += done;
            info!(batch = done, total_processed = *processed, "processed CPE batch");

            let returned = entries.len();
            if start_index + returned >= total {
                info!(total, "reached end of CPE data");
                break;
            }
            start_index += returned;
            if offset_cap.is_some_and(|cap| start_index >= cap) {
                info!(start_index, "reached incremental update limit");
                break;
            }
        }
        Ok(())
    }

    /// Write one page of raw product wrappers and return how many were stored
    /// or found already present. Each entry is its own write, so a bad entry
    /// is logged and skipped without undoing the ones before it.
    pub fn process_batch(&mut self, products: &[Value], upsert: bool) -> usize {
        let mut processed = 0;
        for product in products {
            let Some(cpe) = nested_cpe(product) else {
                warn!(%product, "no CPE data found in product");
                continue;
            };
            let entry = match normalize(cpe) {
                Ok(entry) => entry,
                Err(reason) => {
                    warn!(%reason, "skipping malformed CPE entry");
                    continue;
                }
            };
            let written = if upsert {
                self.db.upsert_record(&entry)
            } else {
                self.db.create_record_if_absent(&entry)
            };
            match written {
                Ok(WriteOutcome::Created) => debug!(cpe = %entry.cpe_name, "created CPE record"),
                Ok(WriteOutcome::Updated) => debug!(cpe = %entry.cpe_name, "updated CPE record"),
                Ok(WriteOutcome::AlreadyExists) => debug!(cpe = %entry.cpe_name, "CPE record already exists"),
                Err(e) => {
                    error!(cpe = %entry.cpe_name, error = %e, "error processing CPE record");
                    continue;
                }
            }
            processed += 1;
        }
        processed
    }
}
