use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EntryId, StockId, UserId};

/// A stock the user tracks without owning it. At most one per stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub stock_id: StockId,
    pub symbol: String,
    pub note: Option<String>,
    pub added_at: DateTime<Utc>,
}
