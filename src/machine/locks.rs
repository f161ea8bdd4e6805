//! Per-stock exclusion so only one transition per stock is in flight.

use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::StockId;

/// What to do with a second request for a stock that is already busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentionPolicy {
    /// Wait for the running transition, then run against its result.
    #[default]
    Queue,
    /// Fail immediately with `Busy`.
    Reject,
}

impl FromStr for ContentionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queue" => Ok(ContentionPolicy::Queue),
            "reject" => Ok(ContentionPolicy::Reject),
            other => Err(format!("unknown contention policy '{}'", other)),
        }
    }
}

#[derive(Debug, Default)]
pub struct StockLocks {
    locks: DashMap<StockId, Arc<Mutex<()>>>,
}

impl StockLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, stock_id: StockId) -> Arc<Mutex<()>> {
        self.locks.entry(stock_id).or_default().clone()
    }

    pub async fn acquire(&self, stock_id: StockId) -> OwnedMutexGuard<()> {
        self.slot(stock_id).lock_owned().await
    }

    pub fn try_acquire(&self, stock_id: StockId) -> Option<OwnedMutexGuard<()>> {
        self.slot(stock_id).try_lock_owned().ok()
    }

    pub fn is_busy(&self, stock_id: StockId) -> bool {
        self.locks
            .get(&stock_id)
            .map(|slot| slot.try_lock().is_err())
            .unwrap_or(false)
    }
}
