//! The user's positions and watchlist as last fetched from the portfolio service.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::types::position::Position;
use crate::types::watchlist::WatchlistEntry;
use crate::types::StockId;

/// Per-stock state. A stock is never both watched and held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StockState {
    Untracked,
    Watching,
    Held,
}

impl fmt::Display for StockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StockState::Untracked => "untracked",
            StockState::Watching => "watching",
            StockState::Held => "held",
        };
        f.write_str(label)
    }
}

/// Borrowed view of what the snapshot holds for one stock.
#[derive(Debug, Clone, Copy)]
pub enum Holding<'a> {
    Untracked,
    Watching(&'a WatchlistEntry),
    Held {
        position: &'a Position,
        /// Watchlist entry the service still reports for a held stock.
        shadowed: Option<&'a WatchlistEntry>,
    },
}

impl Holding<'_> {
    pub fn state(&self) -> StockState {
        match self {
            Holding::Untracked => StockState::Untracked,
            Holding::Watching(_) => StockState::Watching,
            Holding::Held { .. } => StockState::Held,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    positions: BTreeMap<StockId, Position>,
    watchlist: BTreeMap<StockId, WatchlistEntry>,
    shadowed: BTreeMap<StockId, WatchlistEntry>,
    generation: u64,
    fetched_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Build from a service listing. Positions without shares are dropped. Positions win
    /// over watchlist entries for the same stock; such entries are kept aside as shadowed
    /// so the next transition can clean them up.
    pub fn from_listing(
        positions: Vec<Position>,
        watchlist: Vec<WatchlistEntry>,
        generation: u64,
    ) -> Self {
        let mut by_stock: BTreeMap<StockId, Position> = BTreeMap::new();
        for position in positions {
            if position.quantity == 0 {
                tracing::warn!(
                    stock_id = position.stock_id,
                    position_id = position.id,
                    "ignoring position with no shares"
                );
                continue;
            }
            if let Some(existing) = by_stock.get(&position.stock_id) {
                tracing::warn!(
                    stock_id = position.stock_id,
                    kept = existing.id,
                    ignored = position.id,
                    "service returned more than one position for a stock"
                );
                continue;
            }
            by_stock.insert(position.stock_id, position);
        }

        let mut entries = BTreeMap::new();
        let mut shadowed = BTreeMap::new();
        for entry in watchlist {
            let target = if by_stock.contains_key(&entry.stock_id) {
                tracing::warn!(
                    stock_id = entry.stock_id,
                    entry_id = entry.id,
                    "watchlist entry reported for a held stock"
                );
                &mut shadowed
            } else {
                &mut entries
            };
            if target.contains_key(&entry.stock_id) {
                tracing::warn!(
                    stock_id = entry.stock_id,
                    ignored = entry.id,
                    "duplicate watchlist entry"
                );
                continue;
            }
            target.insert(entry.stock_id, entry);
        }

        Self {
            positions: by_stock,
            watchlist: entries,
            shadowed,
            generation,
            fetched_at: Some(Utc::now()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn holding(&self, stock_id: StockId) -> Holding<'_> {
        if let Some(position) = self.positions.get(&stock_id) {
            return Holding::Held {
                position,
                shadowed: self.shadowed.get(&stock_id),
            };
        }
        match self.watchlist.get(&stock_id) {
            Some(entry) => Holding::Watching(entry),
            None => Holding::Untracked,
        }
    }

    pub fn state_of(&self, stock_id: StockId) -> StockState {
        self.holding(stock_id).state()
    }

    pub fn position(&self, stock_id: StockId) -> Option<&Position> {
        self.positions.get(&stock_id)
    }

    pub fn watchlist_entry(&self, stock_id: StockId) -> Option<&WatchlistEntry> {
        self.watchlist.get(&stock_id)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn watchlist(&self) -> impl Iterator<Item = &WatchlistEntry> {
        self.watchlist.values()
    }

    pub fn shadowed(&self) -> impl Iterator<Item = &WatchlistEntry> {
        self.shadowed.values()
    }

    /// No stock appears both in positions and in the visible watchlist.
    pub fn is_exclusive(&self) -> bool {
        self.watchlist
            .keys()
            .all(|stock_id| !self.positions.contains_key(stock_id))
    }
}
