//! Daily usage guard for metered API calls.
//!
//! A single [`UsageRecord`] is persisted through a [`UsageStore`]. The
//! [`UsageGuard`] answers "may we make another metered call today?" and
//! records calls after they succeed. [`UsageService`] owns a guard on a
//! dedicated thread so every read-modify-write is serialized.

mod guard;
mod service;
mod store;

pub use guard::{UsageGuard, UsageSnapshot};
pub use service::UsageService;
pub use store::{FileUsageStore, MemoryUsageStore, UsageStore};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The persisted counter: number of metered calls made on `date`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageRecord {
    pub date: NaiveDate,
    pub count: u32,
}

impl UsageRecord {
    pub fn fresh(date: NaiveDate) -> Self {
        Self { date, count: 0 }
    }

    /// The record as it applies to `today`: a stale date counts as zero.
    pub fn effective_for(self, today: NaiveDate) -> Self {
        if self.date == today {
            self
        } else {
            Self::fresh(today)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("usage file {path} could not be accessed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("usage file {path} is malformed: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("usage file {path} could not be locked: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("usage guard is not running")]
    Unavailable,
}

/// Source of the current calendar date.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local calendar date of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// Always reports the same date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
