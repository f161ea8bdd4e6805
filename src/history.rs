//! Totals shown under the trade history table.

use serde::Serialize;

use crate::types::trade::{TradeRecord, TradeSide};

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TradeHistorySummary {
    pub buys: usize,
    pub sells: usize,
    pub total_bought: f64,
    pub total_sold: f64,
    /// Sold minus bought; positive means more cash came back than was spent.
    pub net: f64,
}

impl TradeHistorySummary {
    pub fn from_records(records: &[TradeRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            match record.side {
                TradeSide::Buy => {
                    summary.buys += 1;
                    summary.total_bought += record.total_amount;
                }
                TradeSide::Sell => {
                    summary.sells += 1;
                    summary.total_sold += record.total_amount;
                }
            }
        }
        summary.net = summary.total_sold - summary.total_bought;
        summary
    }
}
