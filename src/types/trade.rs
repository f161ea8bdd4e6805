use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Price, Qty};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// One executed trade as recorded by the portfolio service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: i64,
    pub side: TradeSide,
    pub symbol: String,
    pub name: String,
    pub quantity: Qty,
    pub price_per_share: Price,
    pub total_amount: f64,
    pub traded_at: DateTime<Utc>,
    pub note: Option<String>,
}
