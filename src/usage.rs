//! Daily token usage ledger
//!
//! A single process-wide counter of tokens spent today, persisted to a small
//! JSON file after every update so it survives restarts. The counter belongs
//! to one calendar day (UTC); a stored value from any other day is discarded
//! when read.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Cumulative usage for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub usage: u64,
    pub date: NaiveDate,
}

impl UsageCounter {
    pub fn fresh(date: NaiveDate) -> Self {
        Self { usage: 0, date }
    }
}

/// How much of the daily budget is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    Unlimited,
    Remaining(u64),
}

impl Budget {
    pub fn allows(&self, cost: u64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Remaining(left) => cost <= *left,
        }
    }
}

impl std::fmt::Display for Budget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlimited => write!(f, "unlimited"),
            Self::Remaining(left) => write!(f, "{}", left),
        }
    }
}

/// Persists and resets the daily usage counter.
pub struct UsageLedger {
    path: PathBuf,
    counter: Mutex<UsageCounter>,
}

impl UsageLedger {
    /// Open the ledger backed by `path`, loading today's counter.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::open_on(path, today())
    }

    pub fn open_on(path: impl Into<PathBuf>, today: NaiveDate) -> Self {
        let path = path.into();
        let counter = load_from(&path, today);
        info!(usage = counter.usage, date = %counter.date, "Loaded token usage");
        Self {
            path,
            counter: Mutex::new(counter),
        }
    }

    /// Current counter for today.
    pub fn load(&self) -> UsageCounter {
        self.load_on(today())
    }

    pub fn load_on(&self, today: NaiveDate) -> UsageCounter {
        let mut counter = self.lock();
        roll_over(&mut counter, today);
        *counter
    }

    /// Add `cost` to today's counter and persist it.
    ///
    /// A failed write is logged; the in-memory count still advances.
    pub fn record(&self, cost: u64) -> UsageCounter {
        self.record_on(cost, today())
    }

    pub fn record_on(&self, cost: u64, today: NaiveDate) -> UsageCounter {
        let mut counter = self.lock();
        roll_over(&mut counter, today);
        counter.usage = counter.usage.saturating_add(cost);

        if let Err(e) = persist(&self.path, &counter) {
            warn!(error = %e, path = ?self.path, "Failed to persist token usage");
        }
        debug!(added = cost, total = counter.usage, "Recorded token usage");
        *counter
    }

    /// Remaining budget under `daily_cap` (0 = unlimited).
    pub fn remaining_budget(&self, daily_cap: u64) -> Budget {
        self.remaining_budget_on(daily_cap, today())
    }

    pub fn remaining_budget_on(&self, daily_cap: u64, today: NaiveDate) -> Budget {
        if daily_cap == 0 {
            return Budget::Unlimited;
        }
        let current = self.load_on(today).usage;
        Budget::Remaining(daily_cap.saturating_sub(current))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UsageCounter> {
        // The counter stays consistent even if a holder panicked mid-update.
        self.counter.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn roll_over(counter: &mut UsageCounter, today: NaiveDate) {
    if counter.date != today {
        info!(previous = %counter.date, usage = counter.usage, "New day, resetting token usage");
        *counter = UsageCounter::fresh(today);
    }
}

/// Read the persisted counter; anything missing, unreadable or stale yields zero.
fn load_from(path: &Path, today: NaiveDate) -> UsageCounter {
    let stored = match read_counter(path) {
        Ok(Some(counter)) => counter,
        Ok(None) => return UsageCounter::fresh(today),
        Err(e) => {
            warn!(error = %e, path = ?path, "Ignoring unreadable token usage file");
            return UsageCounter::fresh(today);
        }
    };

    if stored.date != today {
        return UsageCounter::fresh(today);
    }
    stored
}

fn read_counter(path: &Path) -> Result<Option<UsageCounter>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).context("Failed to read usage file")?;
    let counter = serde_json::from_str(&content).context("Failed to parse usage file")?;
    Ok(Some(counter))
}

fn persist(path: &Path, counter: &UsageCounter) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create usage directory")?;
    }
    let content = serde_json::to_string(counter).context("Failed to serialize usage")?;

    // Write-then-rename so the file on disk is always a complete record.
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content).context("Failed to write usage file")?;
    std::fs::rename(&tmp, path).context("Failed to replace usage file")?;
    Ok(())
}
