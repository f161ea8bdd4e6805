//! In-process portfolio service with the same semantics as the REST backend:
//! weighted-average upsert on buy, delete at zero, one watchlist entry per stock.
//! Does not enforce position/watchlist exclusivity; that is the client's job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::error::RemoteError;
use crate::remote::PortfolioService;
use crate::session::Session;
use crate::types::position::{Position, PositionChange};
use crate::types::quote::Quote;
use crate::types::stock::Stock;
use crate::types::trade::{TradeRecord, TradeSide};
use crate::types::watchlist::WatchlistEntry;
use crate::types::{EntryId, PositionId, Price, Qty, StockId, UserId};

#[derive(Debug, Default)]
struct Book {
    stocks: HashMap<StockId, Stock>,
    positions: HashMap<StockId, Position>,
    watchlist: HashMap<StockId, WatchlistEntry>,
    trades: Vec<TradeRecord>,
}

#[derive(Debug)]
pub struct InMemoryPortfolio {
    user_id: UserId,
    book: RwLock<Book>,
    quotes: DashMap<String, Quote>,
    next_id: AtomicI64,
}

fn rejected(detail: &str) -> RemoteError {
    RemoteError::Rejected {
        status: 400,
        detail: detail.to_string(),
    }
}

impl InMemoryPortfolio {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            book: RwLock::new(Book::default()),
            quotes: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn add_stock(&self, stock: Stock) {
        self.book.write().await.stocks.insert(stock.id, stock);
    }

    pub fn set_quote(&self, quote: Quote) {
        self.quotes.insert(quote.symbol.to_uppercase(), quote);
    }

    pub fn clear_quote(&self, symbol: &str) {
        self.quotes.remove(&symbol.to_uppercase());
    }

    fn record_trade(
        &self,
        book: &mut Book,
        stock_id: StockId,
        side: TradeSide,
        quantity: Qty,
        price: Price,
    ) {
        let (symbol, name) = book
            .stocks
            .get(&stock_id)
            .map(|s| (s.symbol.clone(), s.name.clone()))
            .unwrap_or_default();
        book.trades.push(TradeRecord {
            id: self.next_id(),
            side,
            symbol,
            name,
            quantity,
            price_per_share: price,
            total_amount: quantity as f64 * price,
            traded_at: Utc::now(),
            note: None,
        });
    }
}

#[async_trait]
impl PortfolioService for InMemoryPortfolio {
    async fn list_positions(&self, _session: &Session) -> Result<Vec<Position>, RemoteError> {
        let book = self.book.read().await;
        let mut positions: Vec<Position> = book.positions.values().cloned().collect();
        positions.sort_by_key(|p| p.id);
        Ok(positions)
    }

    async fn list_watchlist(&self, _session: &Session) -> Result<Vec<WatchlistEntry>, RemoteError> {
        let book = self.book.read().await;
        let mut entries: Vec<WatchlistEntry> = book.watchlist.values().cloned().collect();
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }

    async fn create_or_increase_position(
        &self,
        _session: &Session,
        stock_id: StockId,
        quantity: Qty,
        price: Price,
    ) -> Result<Position, RemoteError> {
        if quantity == 0 {
            return Err(rejected("Quantity must be greater than 0"));
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(rejected("Purchase price must be greater than 0"));
        }

        let mut book = self.book.write().await;
        let symbol = match book.stocks.get(&stock_id) {
            Some(stock) => stock.symbol.clone(),
            None => return Err(RemoteError::NotFound("Stock not found".to_string())),
        };

        let position = match book.positions.get(&stock_id) {
            Some(existing) => {
                let total = existing.quantity + quantity;
                let cost =
                    existing.quantity as f64 * existing.average_price + quantity as f64 * price;
                Position {
                    quantity: total,
                    average_price: cost / total as f64,
                    ..existing.clone()
                }
            }
            None => Position {
                id: self.next_id(),
                user_id: self.user_id,
                stock_id,
                symbol,
                quantity,
                average_price: price,
                purchased_at: Utc::now(),
            },
        };
        book.positions.insert(stock_id, position.clone());
        self.record_trade(&mut book, stock_id, TradeSide::Buy, quantity, price);
        Ok(position)
    }

    async fn decrease_or_delete_position(
        &self,
        _session: &Session,
        position_id: PositionId,
        quantity: Qty,
    ) -> Result<PositionChange, RemoteError> {
        let mut book = self.book.write().await;
        let position = book
            .positions
            .values()
            .find(|p| p.id == position_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound("Position not found".to_string()))?;

        if quantity == 0 {
            return Err(rejected("Quantity must be greater than 0"));
        }
        if quantity > position.quantity {
            return Err(rejected("Cannot sell more shares than owned"));
        }

        let price = self
            .quotes
            .get(&position.symbol)
            .map(|q| q.price)
            .unwrap_or(position.average_price);
        self.record_trade(&mut book, position.stock_id, TradeSide::Sell, quantity, price);

        let remaining = position.quantity - quantity;
        if remaining == 0 {
            book.positions.remove(&position.stock_id);
            return Ok(PositionChange::Deleted);
        }
        let updated = Position {
            quantity: remaining,
            ..position
        };
        book.positions.insert(updated.stock_id, updated.clone());
        Ok(PositionChange::Remaining(updated))
    }

    async fn add_watchlist_entry(
        &self,
        _session: &Session,
        stock_id: StockId,
        note: Option<&str>,
    ) -> Result<WatchlistEntry, RemoteError> {
        let mut book = self.book.write().await;
        let symbol = match book.stocks.get(&stock_id) {
            Some(stock) => stock.symbol.clone(),
            None => return Err(RemoteError::NotFound("Stock not found".to_string())),
        };
        if book.watchlist.contains_key(&stock_id) {
            return Err(rejected(&format!(
                "Stock '{}' is already in your watchlist",
                symbol
            )));
        }
        let entry = WatchlistEntry {
            id: self.next_id(),
            user_id: self.user_id,
            stock_id,
            symbol,
            note: note.map(str::to_string),
            added_at: Utc::now(),
        };
        book.watchlist.insert(stock_id, entry.clone());
        Ok(entry)
    }

    async fn update_watchlist_note(
        &self,
        _session: &Session,
        entry_id: EntryId,
        note: Option<&str>,
    ) -> Result<WatchlistEntry, RemoteError> {
        let mut book = self.book.write().await;
        let entry = book
            .watchlist
            .values_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| RemoteError::NotFound("Watchlist item not found".to_string()))?;
        entry.note = note.map(str::to_string);
        Ok(entry.clone())
    }

    async fn remove_watchlist_entry(
        &self,
        _session: &Session,
        entry_id: EntryId,
    ) -> Result<(), RemoteError> {
        let mut book = self.book.write().await;
        let stock_id = book
            .watchlist
            .values()
            .find(|e| e.id == entry_id)
            .map(|e| e.stock_id)
            .ok_or_else(|| RemoteError::NotFound("Watchlist item not found".to_string()))?;
        book.watchlist.remove(&stock_id);
        Ok(())
    }

    async fn list_stocks(&self, _session: &Session) -> Result<Vec<Stock>, RemoteError> {
        let book = self.book.read().await;
        let mut stocks: Vec<Stock> = book.stocks.values().cloned().collect();
        stocks.sort_by_key(|s| s.id);
        Ok(stocks)
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, RemoteError> {
        self.quotes
            .get(&symbol.to_uppercase())
            .map(|q| q.value().clone())
            .ok_or_else(|| RemoteError::NotFound(format!("No quote for {}", symbol)))
    }

    async fn list_trade_history(
        &self,
        _session: &Session,
    ) -> Result<Vec<TradeRecord>, RemoteError> {
        let book = self.book.read().await;
        Ok(book.trades.iter().rev().cloned().collect())
    }
}
