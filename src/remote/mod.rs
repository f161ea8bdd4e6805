//! Contract of the remote portfolio service, the source of truth for positions and watchlist.

mod http;
mod memory;
mod wire;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::session::Session;
use crate::types::position::{Position, PositionChange};
use crate::types::quote::Quote;
use crate::types::stock::Stock;
use crate::types::trade::TradeRecord;
use crate::types::watchlist::WatchlistEntry;
use crate::types::{EntryId, PositionId, Price, Qty, StockId};

pub use http::HttpPortfolioService;
pub use memory::InMemoryPortfolio;

#[async_trait]
pub trait PortfolioService: Send + Sync {
    async fn list_positions(&self, session: &Session) -> Result<Vec<Position>, RemoteError>;

    async fn list_watchlist(&self, session: &Session) -> Result<Vec<WatchlistEntry>, RemoteError>;

    /// Creates the position, or adds to it with a quantity-weighted average price.
    async fn create_or_increase_position(
        &self,
        session: &Session,
        stock_id: StockId,
        quantity: Qty,
        price: Price,
    ) -> Result<Position, RemoteError>;

    /// Removes `quantity` shares; the position is deleted when none remain.
    async fn decrease_or_delete_position(
        &self,
        session: &Session,
        position_id: PositionId,
        quantity: Qty,
    ) -> Result<PositionChange, RemoteError>;

    async fn add_watchlist_entry(
        &self,
        session: &Session,
        stock_id: StockId,
        note: Option<&str>,
    ) -> Result<WatchlistEntry, RemoteError>;

    async fn update_watchlist_note(
        &self,
        session: &Session,
        entry_id: EntryId,
        note: Option<&str>,
    ) -> Result<WatchlistEntry, RemoteError>;

    async fn remove_watchlist_entry(
        &self,
        session: &Session,
        entry_id: EntryId,
    ) -> Result<(), RemoteError>;

    async fn list_stocks(&self, session: &Session) -> Result<Vec<Stock>, RemoteError>;

    /// Best-effort market quote; may be stale or missing.
    async fn get_quote(&self, symbol: &str) -> Result<Quote, RemoteError>;

    async fn list_trade_history(&self, session: &Session) -> Result<Vec<TradeRecord>, RemoteError>;
}
