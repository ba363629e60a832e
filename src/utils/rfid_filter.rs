use std::sync::{PoisonError, RwLock};

use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use tracing::info;

use crate::store::Store;

/// Expected capacity and false-positive rate.
/// Tune these based on the number of issued cards.
pub const FILTER_CAPACITY: usize = 100_000;
pub const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Set membership of registered RFID codes.
///
/// The filter only learns codes from the startup warm-up and from
/// registrations made through this process. A miss is therefore definitive
/// only while the store is private to this process; against a shared store a
/// miss has to be confirmed with a lookup. A hit may be a false positive and
/// must always be confirmed.
pub struct RfidFilter {
    inner: RwLock<CuckooFilter<String>>,
}

#[inline]
fn normalize(code: &str) -> String {
    code.trim().to_string()
}

impl Default for RfidFilter {
    fn default() -> Self {
        Self::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)
    }
}

impl RfidFilter {
    pub fn new(capacity: usize, false_positive_rate: f64) -> Self {
        Self {
            inner: RwLock::new(CuckooFilter::new(capacity, false_positive_rate)),
        }
    }

    /// Check if a code might be registered (false positives possible)
    pub fn might_contain(&self, code: &str) -> bool {
        let code = normalize(code);
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&code)
    }

    pub fn insert(&self, code: &str) {
        let code = normalize(code);
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(&code);
    }

    /// Insert a batch of codes under one write lock
    fn insert_batch(&self, codes: &[String]) {
        let mut filter = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for code in codes {
            filter.add(&normalize(code));
        }
    }

    /// Loads every registered code from the store. Returns how many were added.
    pub async fn warmup(&self, store: &dyn Store, batch_size: usize) -> Result<usize> {
        let codes = store
            .list_rfid_codes()
            .await
            .map_err(|e| anyhow!("failed to load RFID codes: {}", e))?;

        for batch in codes.chunks(batch_size.max(1)) {
            self.insert_batch(batch);
        }

        info!(total = codes.len(), "RFID filter warmup complete");
        Ok(codes.len())
    }
}
