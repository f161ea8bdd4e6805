use std::sync::Arc;

use thiserror::Error;

use crate::machine::snapshot::Snapshot;
use crate::types::Qty;

/// Failure reported by a portfolio service call.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("not authorized by the portfolio service")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("portfolio service error ({status}): {detail}")]
    Server { status: u16, detail: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Map a non-success HTTP status and its `detail` text.
    pub fn from_status(status: u16, detail: String) -> Self {
        match status {
            401 | 403 => RemoteError::Unauthorized,
            404 => RemoteError::NotFound(detail),
            400..=499 => RemoteError::Rejected { status, detail },
            _ => RemoteError::Server { status, detail },
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            RemoteError::Decode(value.to_string())
        } else {
            RemoteError::Transport(value.to_string())
        }
    }
}

/// Everything a trade, watch or refresh can fail with. `Display` is the user-facing message.
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("quantity must be a whole number greater than zero (got {0})")]
    InvalidQuantity(String),

    #[error("price must be a positive amount (got {0})")]
    InvalidPrice(f64),

    #[error("cannot sell {requested} shares of {symbol}: only {held} held")]
    InsufficientShares {
        symbol: String,
        requested: Qty,
        held: Qty,
    },

    #[error("you do not own any shares of {0}")]
    NotOwned(String),

    #[error("stock {0} not found")]
    StockNotFound(String),

    #[error("{symbol} is held in your portfolio and cannot be {action}")]
    ConflictingState {
        symbol: String,
        action: &'static str,
    },

    #[error("{0} is not on your watchlist")]
    NotWatching(String),

    #[error("no market price available for {0}; enter a price to trade")]
    PriceUnavailable(String),

    #[error("a request for {0} is already in progress")]
    Busy(String),

    #[error("your session has expired; please log in again")]
    Unauthenticated,

    /// A remote call failed after the transition started. `snapshot` is the state
    /// re-fetched from the service afterwards (or the last known one if `refreshed` is false).
    #[error("portfolio service failed while trying to {effect}: {source}")]
    RemoteServiceFailure {
        step: usize,
        effect: &'static str,
        #[source]
        source: RemoteError,
        snapshot: Arc<Snapshot>,
        refreshed: bool,
    },
}
