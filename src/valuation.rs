//! Display values derived from positions and quotes. Recomputed on every call, never stored.

use serde::Serialize;

use crate::types::Price;
use crate::types::position::Position;
use crate::types::quote::Quote;

/// Current market value: quantity × latest quote price. `None` without a quote.
pub fn position_value(position: &Position, quote: Option<&Quote>) -> Option<f64> {
    quote.map(|q| position.quantity as f64 * q.price)
}

pub fn cost_basis(position: &Position) -> f64 {
    position.quantity as f64 * position.average_price
}

/// Unrealized P&L: (current_price - average_price) * quantity.
pub fn unrealized_pnl(position: &Position, current_price: Price) -> f64 {
    (current_price - position.average_price) * position.quantity as f64
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PortfolioSummary {
    /// Market value of the positions that have a quote.
    pub total_value: f64,
    pub total_cost: f64,
    pub unrealized_pnl: f64,
    pub total_positions: usize,
    pub total_stocks: usize,
    /// Symbols without a quote; excluded from value and P&L.
    pub unpriced: Vec<String>,
}

pub fn summarize<'a, I, F>(positions: I, quote_for: F) -> PortfolioSummary
where
    I: IntoIterator<Item = &'a Position>,
    F: Fn(&str) -> Option<Quote>,
{
    let mut summary = PortfolioSummary::default();
    let mut stocks = std::collections::BTreeSet::new();

    for position in positions {
        summary.total_positions += 1;
        stocks.insert(position.stock_id);
        summary.total_cost += cost_basis(position);

        match quote_for(&position.symbol) {
            Some(quote) => {
                summary.total_value += position.quantity as f64 * quote.price;
                summary.unrealized_pnl += unrealized_pnl(position, quote.price);
            }
            None => summary.unpriced.push(position.symbol.clone()),
        }
    }

    summary.total_stocks = stocks.len();
    summary
}
