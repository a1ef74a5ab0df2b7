use std::collections::HashMap;

use chrono::{SubsecRound, Utc};
use tracing::{debug, info};

use crate::error::LoadError;
use crate::models::market::MarketSnapshotRecord;
use crate::services::storage::SnapshotStore;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Writes transformed records to a [`SnapshotStore`] in bounded batches
#[derive(Clone)]
pub struct Loader<T> {
    store: T,
}

impl<T> Loader<T>
where
    T: SnapshotStore + Clone,
{
    pub fn new(store: T) -> Self {
        Self { store }
    }

    /// Upsert `records` in batches of `batch_size`, each one atomic.
    ///
    /// Batches are written in order and the first failure stops the load;
    /// batches committed before it stay committed.
    pub async fn load(
        &self,
        records: Vec<MarketSnapshotRecord>,
        batch_size: usize,
    ) -> Result<usize, LoadError> {
        if records.is_empty() {
            info!("No records to load");
            return Ok(0);
        }

        let stamp = Utc::now().trunc_subsecs(6);
        let records: Vec<MarketSnapshotRecord> = records
            .into_iter()
            .map(|mut record| {
                record.extracted_at.get_or_insert(stamp);
                record
            })
            .collect();

        let batch_size = batch_size.max(1);
        let mut loaded = 0;

        for (index, chunk) in records.chunks(batch_size).enumerate() {
            let batch = collapse_duplicate_keys(chunk);

            let written = self
                .store
                .upsert_batch(&batch)
                .await
                .map_err(|source| LoadError::Batch {
                    batch: index + 1,
                    records: batch.len(),
                    source,
                })?;

            debug!("Inserted batch {}: {} records", index + 1, written);
            loaded += written;
        }

        info!("Successfully loaded {} records to database", loaded);
        Ok(loaded)
    }
}

/// A single `INSERT .. ON CONFLICT DO UPDATE` cannot touch the same row twice,
/// so repeated keys within a batch keep only their last occurrence.
fn collapse_duplicate_keys(chunk: &[MarketSnapshotRecord]) -> Vec<MarketSnapshotRecord> {
    let mut positions = HashMap::with_capacity(chunk.len());
    let mut batch: Vec<MarketSnapshotRecord> = Vec::with_capacity(chunk.len());

    for record in chunk {
        match positions.get(&record.key()) {
            Some(&position) => batch[position] = record.clone(),
            None => {
                positions.insert(record.key(), batch.len());
                batch.push(record.clone());
            }
        }
    }

    batch
}
