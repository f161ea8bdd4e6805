//! Shared fixtures: a seeded in-memory portfolio and a wrapper that records and fails calls.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use paper_trader::machine::{ContentionPolicy, MachineOptions, TradingStateMachine};
use paper_trader::remote::{InMemoryPortfolio, PortfolioService};
use paper_trader::types::position::{Position, PositionChange};
use paper_trader::types::quote::Quote;
use paper_trader::types::stock::Stock;
use paper_trader::types::trade::TradeRecord;
use paper_trader::types::watchlist::WatchlistEntry;
use paper_trader::types::{EntryId, PositionId, Price, Qty, StockId};
use paper_trader::{RemoteError, Session};

pub const AAPL: StockId = 1;
pub const MSFT: StockId = 2;
pub const NVDA: StockId = 3;

const MUTATIONS: [&str; 5] = [
    "create_or_increase_position",
    "decrease_or_delete_position",
    "add_watchlist_entry",
    "update_watchlist_note",
    "remove_watchlist_entry",
];

pub fn session() -> Session {
    Session::new("test-token").unwrap()
}

pub async fn seeded_portfolio() -> Arc<InMemoryPortfolio> {
    let portfolio = InMemoryPortfolio::new(7);
    portfolio.add_stock(Stock::new(AAPL, "AAPL", "Apple Inc.")).await;
    portfolio.add_stock(Stock::new(MSFT, "MSFT", "Microsoft Corp.")).await;
    portfolio.add_stock(Stock::new(NVDA, "NVDA", "NVIDIA Corp.")).await;
    portfolio.set_quote(Quote::new("AAPL", 190.0, 1.5, 0.79));
    portfolio.set_quote(Quote::new("MSFT", 410.0, -2.0, -0.49));
    portfolio.set_quote(Quote::new("NVDA", 120.0, 0.0, 0.0));
    Arc::new(portfolio)
}

/// Forwards to an in-memory portfolio, logging every call. Failures can be queued per
/// operation and mutating calls can be slowed down.
pub struct FlakyService {
    inner: Arc<InMemoryPortfolio>,
    calls: Mutex<Vec<&'static str>>,
    failures: Mutex<HashMap<&'static str, Vec<RemoteError>>>,
    delay: Mutex<Option<Duration>>,
}

impl FlakyService {
    pub fn new(inner: Arc<InMemoryPortfolio>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &InMemoryPortfolio {
        &self.inner
    }

    /// The next call of `op` fails with `error`.
    pub fn fail_next(&self, op: &'static str, error: RemoteError) {
        self.failures.lock().unwrap().entry(op).or_default().push(error);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// Mutating calls only, in the order they were issued.
    pub fn mutations(&self) -> Vec<&'static str> {
        self.calls()
            .into_iter()
            .filter(|op| MUTATIONS.contains(op))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    async fn enter(&self, op: &'static str) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(op);
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(op)
            .and_then(|queued| (!queued.is_empty()).then(|| queued.remove(0)));
        if MUTATIONS.contains(&op) {
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PortfolioService for FlakyService {
    async fn list_positions(&self, session: &Session) -> Result<Vec<Position>, RemoteError> {
        self.enter("list_positions").await?;
        self.inner.list_positions(session).await
    }

    async fn list_watchlist(&self, session: &Session) -> Result<Vec<WatchlistEntry>, RemoteError> {
        self.enter("list_watchlist").await?;
        self.inner.list_watchlist(session).await
    }

    async fn create_or_increase_position(
        &self,
        session: &Session,
        stock_id: StockId,
        quantity: Qty,
        price: Price,
    ) -> Result<Position, RemoteError> {
        self.enter("create_or_increase_position").await?;
        self.inner
            .create_or_increase_position(session, stock_id, quantity, price)
            .await
    }

    async fn decrease_or_delete_position(
        &self,
        session: &Session,
        position_id: PositionId,
        quantity: Qty,
    ) -> Result<PositionChange, RemoteError> {
        self.enter("decrease_or_delete_position").await?;
        self.inner
            .decrease_or_delete_position(session, position_id, quantity)
            .await
    }

    async fn add_watchlist_entry(
        &self,
        session: &Session,
        stock_id: StockId,
        note: Option<&str>,
    ) -> Result<WatchlistEntry, RemoteError> {
        self.enter("add_watchlist_entry").await?;
        self.inner.add_watchlist_entry(session, stock_id, note).await
    }

    async fn update_watchlist_note(
        &self,
        session: &Session,
        entry_id: EntryId,
        note: Option<&str>,
    ) -> Result<WatchlistEntry, RemoteError> {
        self.enter("update_watchlist_note").await?;
        self.inner.update_watchlist_note(session, entry_id, note).await
    }

    async fn remove_watchlist_entry(
        &self,
        session: &Session,
        entry_id: EntryId,
    ) -> Result<(), RemoteError> {
        self.enter("remove_watchlist_entry").await?;
        self.inner.remove_watchlist_entry(session, entry_id).await
    }

    async fn list_stocks(&self, session: &Session) -> Result<Vec<Stock>, RemoteError> {
        self.enter("list_stocks").await?;
        self.inner.list_stocks(session).await
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, RemoteError> {
        self.enter("get_quote").await?;
        self.inner.get_quote(symbol).await
    }

    async fn list_trade_history(&self, session: &Session) -> Result<Vec<TradeRecord>, RemoteError> {
        self.enter("list_trade_history").await?;
        self.inner.list_trade_history(session).await
    }
}

pub fn options(contention: ContentionPolicy) -> MachineOptions {
    MachineOptions {
        contention,
        ..MachineOptions::default()
    }
}

/// A machine over a fresh seeded portfolio, already refreshed.
pub async fn machine(
    contention: ContentionPolicy,
) -> (Arc<TradingStateMachine>, Arc<FlakyService>) {
    let service = Arc::new(FlakyService::new(seeded_portfolio().await));
    let machine = TradingStateMachine::new(service.clone(), session(), options(contention));
    machine.refresh().await.unwrap();
    service.clear_calls();
    (Arc::new(machine), service)
}

pub fn server_error() -> RemoteError {
    RemoteError::Server {
        status: 500,
        detail: "Internal server error".to_string(),
    }
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}
