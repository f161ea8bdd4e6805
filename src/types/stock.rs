use serde::{Deserialize, Serialize};

use crate::types::StockId;

fn default_currency() -> String {
    "USD".to_string()
}

/// Reference data for a tradable stock. Fetched, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub id: StockId,
    pub symbol: String,
    pub name: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
}

impl Stock {
    pub fn new(id: StockId, symbol: &str, name: &str) -> Self {
        Self {
            id,
            symbol: symbol.to_uppercase(),
            name: name.to_string(),
            currency: default_currency(),
            description: None,
            sector: None,
            exchange: None,
        }
    }
}
