use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{PositionId, Price, Qty, StockId, UserId};

/// Shares of one stock owned by the user. At most one per stock; removed when quantity hits 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub user_id: UserId,
    pub stock_id: StockId,
    pub symbol: String,
    pub quantity: Qty,
    pub average_price: Price,
    pub purchased_at: DateTime<Utc>,
}

/// Result of decreasing a position: either some shares remain or the position is gone.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionChange {
    Remaining(Position),
    Deleted,
}
