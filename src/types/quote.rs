use serde::{Deserialize, Serialize};

use crate::types::Price;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

impl Direction {
    pub fn from_change(change: f64) -> Self {
        if change > 0.0 {
            Direction::Up
        } else if change < 0.0 {
            Direction::Down
        } else {
            Direction::Neutral
        }
    }
}

/// Ephemeral market data. Only used for display and as the default execution price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: Price,
    pub change: f64,
    pub percent_change: f64,
    pub direction: Direction,
}

impl Quote {
    pub fn new(symbol: &str, price: Price, change: f64, percent_change: f64) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            price,
            change,
            percent_change,
            direction: Direction::from_change(change),
        }
    }
}
