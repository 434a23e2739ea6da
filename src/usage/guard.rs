use super::{Clock, StorageError, SystemClock, UsageRecord, UsageStore};
use log::debug;
use serde::Serialize;
use std::sync::Arc;

/// Today's usage as seen by the guard.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct UsageSnapshot {
    #[serde(flatten)]
    pub record: UsageRecord,
    pub limit: u32,
    pub remaining: u32,
}

/// Advises whether a metered call may be made today and records calls.
///
/// The guard never blocks `record_usage`; callers are expected to ask
/// `is_allowed` first and only record after the remote call succeeded.
pub struct UsageGuard {
    store: Box<dyn UsageStore>,
    limit: u32,
    clock: Arc<dyn Clock>,
}

impl UsageGuard {
    pub fn new(store: impl UsageStore + 'static, limit: u32) -> Self {
        Self::with_clock(store, limit, Arc::new(SystemClock))
    }

    pub fn with_clock(store: impl UsageStore + 'static, limit: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Box::new(store),
            limit,
            clock,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn current(&self) -> Result<UsageRecord, StorageError> {
        let today = self.clock.today();
        Ok(self
            .store
            .load()?
            .map(|r| r.effective_for(today))
            .unwrap_or_else(|| UsageRecord::fresh(today)))
    }

    /// `true` while today's count is below the limit. Read-only: a stale
    /// date is treated as zero without rewriting the store.
    pub fn is_allowed(&self) -> Result<bool, StorageError> {
        let record = self.current()?;
        Ok(record.count < self.limit)
    }

    /// Count one metered call against today, resetting a stale record first.
    pub fn record_usage(&self) -> Result<UsageRecord, StorageError> {
        let today = self.clock.today();
        let record = self.store.update(&mut |current| {
            let mut record = current
                .map(|r| r.effective_for(today))
                .unwrap_or_else(|| UsageRecord::fresh(today));
            record.count = record.count.saturating_add(1);
            record
        })?;
        debug!("recorded metered call: {}/{} on {}", record.count, self.limit, record.date);
        Ok(record)
    }

    pub fn snapshot(&self) -> Result<UsageSnapshot, StorageError> {
        let record = self.current()?;
        Ok(UsageSnapshot {
            record,
            limit: self.limit,
            remaining: self.limit.saturating_sub(record.count),
        })
    }
}
