//! Executes planned transitions against the portfolio service and owns the committed snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{RwLock, broadcast};

use crate::error::{RemoteError, TradingError};
use crate::machine::events::PortfolioEvent;
use crate::machine::liveness::LivenessToken;
use crate::machine::locks::{ContentionPolicy, StockLocks};
use crate::machine::quotes::QuoteBook;
use crate::machine::snapshot::{Snapshot, StockState};
use crate::machine::transition::{self, Effect, TradeAction};
use crate::remote::PortfolioService;
use crate::session::Session;
use crate::types::position::PositionChange;
use crate::types::quote::Quote;
use crate::types::stock::Stock;
use crate::types::trade::TradeRecord;
use crate::types::{Price, StockId};
use crate::valuation::{self, PortfolioSummary};

#[derive(Debug, Clone)]
pub struct MachineOptions {
    pub contention: ContentionPolicy,
    pub event_capacity: usize,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            contention: ContentionPolicy::Queue,
            event_capacity: 256,
        }
    }
}

pub struct TradingStateMachine {
    service: Arc<dyn PortfolioService>,
    session: RwLock<Option<Session>>,
    snapshot: RwLock<Arc<Snapshot>>,
    catalog: DashMap<StockId, Stock>,
    quotes: QuoteBook,
    locks: StockLocks,
    contention: ContentionPolicy,
    generation: AtomicU64,
    /// Set when a transition stopped half-way without re-fetching; cleared by the next reload.
    stale: AtomicBool,
    events: broadcast::Sender<PortfolioEvent>,
}

impl TradingStateMachine {
    pub fn new(
        service: Arc<dyn PortfolioService>,
        session: Session,
        options: MachineOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            service,
            session: RwLock::new(Some(session)),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            catalog: DashMap::new(),
            quotes: QuoteBook::new(),
            locks: StockLocks::new(),
            contention: options.contention,
            generation: AtomicU64::new(0),
            stale: AtomicBool::new(false),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PortfolioEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: PortfolioEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub async fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    pub async fn state_of(&self, stock_id: StockId) -> StockState {
        self.snapshot.read().await.state_of(stock_id)
    }

    pub fn stock(&self, stock_id: StockId) -> Option<Stock> {
        self.catalog.get(&stock_id).map(|s| s.value().clone())
    }

    pub fn stock_by_symbol(&self, symbol: &str) -> Option<Stock> {
        let wanted = symbol.trim().to_uppercase();
        self.catalog
            .iter()
            .find(|s| s.symbol.eq_ignore_ascii_case(&wanted))
            .map(|s| s.value().clone())
    }

    pub fn stocks(&self) -> Vec<Stock> {
        let mut stocks: Vec<Stock> = self.catalog.iter().map(|s| s.value().clone()).collect();
        stocks.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        stocks
    }

    pub fn quote(&self, symbol: &str) -> Option<Quote> {
        self.quotes.get(symbol)
    }

    pub fn is_busy(&self, stock_id: StockId) -> bool {
        self.locks.is_busy(stock_id)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session
            .read()
            .await
            .as_ref()
            .is_some_and(|s| !s.is_expired())
    }

    /// Install a fresh session after the user logged in again. A snapshot left stale by
    /// the lost session is reloaded here; if that fails the next action retries it.
    pub async fn reauthenticate(&self, session: Session) {
        tracing::info!(subject = ?session.subject(), "session re-established");
        *self.session.write().await = Some(session.clone());
        if let Err(e) = self.reload_if_stale(&session).await {
            tracing::warn!(error = %e, "reload after re-authentication failed");
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    async fn reload_if_stale(&self, session: &Session) -> Result<(), RemoteError> {
        if !self.stale.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!("reloading stale snapshot");
        if let Err(e) = self.reload_snapshot(session).await {
            self.stale.store(true, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    async fn active_session(&self) -> Result<Session, TradingError> {
        let current = self.session.read().await.clone();
        match current {
            Some(session) if !session.is_expired() => Ok(session),
            Some(_) => {
                tracing::warn!("session expired");
                self.drop_session().await;
                Err(TradingError::Unauthenticated)
            }
            None => Err(TradingError::Unauthenticated),
        }
    }

    async fn drop_session(&self) {
        let had_session = self.session.write().await.take().is_some();
        if had_session {
            self.publish(PortfolioEvent::SessionExpired);
        }
    }

    /// Reload the stock catalog, positions and watchlist from the service.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, TradingError> {
        let session = self.active_session().await?;

        let stocks = match self.service.list_stocks(&session).await {
            Ok(stocks) => stocks,
            Err(source) => return Err(self.refresh_failure(source).await),
        };
        for stock in stocks {
            self.catalog.insert(stock.id, stock);
        }

        match self.reload_snapshot(&session).await {
            Ok(snapshot) => {
                self.stale.store(false, Ordering::SeqCst);
                Ok(snapshot)
            }
            Err(source) => Err(self.refresh_failure(source).await),
        }
    }

    async fn refresh_failure(&self, source: RemoteError) -> TradingError {
        if matches!(source, RemoteError::Unauthorized) {
            self.drop_session().await;
            return TradingError::Unauthenticated;
        }
        tracing::warn!(error = %source, "refresh failed");
        TradingError::RemoteServiceFailure {
            step: 0,
            effect: "refresh the portfolio",
            source,
            snapshot: self.snapshot().await,
            refreshed: false,
        }
    }

    /// Fetch positions + watchlist and commit them unless a newer refresh already landed.
    async fn reload_snapshot(&self, session: &Session) -> Result<Arc<Snapshot>, RemoteError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (positions, watchlist) = tokio::try_join!(
            self.service.list_positions(session),
            self.service.list_watchlist(session)
        )?;
        let fresh = Arc::new(Snapshot::from_listing(positions, watchlist, generation));
        Ok(self.commit(fresh).await)
    }

    async fn commit(&self, fresh: Arc<Snapshot>) -> Arc<Snapshot> {
        let mut current = self.snapshot.write().await;
        if fresh.generation() <= current.generation() {
            tracing::debug!(
                stale = fresh.generation(),
                committed = current.generation(),
                "discarding stale refresh"
            );
            return Arc::clone(&*current);
        }
        *current = Arc::clone(&fresh);
        drop(current);
        tracing::debug!(generation = fresh.generation(), "snapshot committed");
        self.publish(PortfolioEvent::SnapshotCommitted(Arc::clone(&fresh)));
        fresh
    }

    /// Fetch quotes for the given symbols. Best-effort; failures are logged and skipped.
    pub async fn refresh_quotes(&self, symbols: &[String]) -> Vec<Quote> {
        let fresh = self.quotes.refresh(self.service.as_ref(), symbols).await;
        for quote in &fresh {
            self.publish(PortfolioEvent::QuoteUpdated(quote.clone()));
        }
        fresh
    }

    /// Refresh quotes for every held and watched stock.
    pub async fn refresh_tracked_quotes(&self) -> Vec<Quote> {
        let snapshot = self.snapshot().await;
        let symbols: Vec<String> = snapshot
            .positions()
            .map(|p| p.symbol.clone())
            .chain(snapshot.watchlist().map(|e| e.symbol.clone()))
            .collect();
        self.refresh_quotes(&symbols).await
    }

    /// Totals derived from the committed snapshot and the latest quotes.
    pub async fn summary(&self) -> PortfolioSummary {
        let snapshot = self.snapshot().await;
        valuation::summarize(snapshot.positions(), |symbol| self.quotes.get(symbol))
    }

    pub async fn trade_history(&self) -> Result<Vec<TradeRecord>, TradingError> {
        let session = self.active_session().await?;
        match self.service.list_trade_history(&session).await {
            Ok(mut records) => {
                records.sort_by(|a, b| b.traded_at.cmp(&a.traded_at));
                Ok(records)
            }
            Err(RemoteError::Unauthorized) => {
                self.drop_session().await;
                Err(TradingError::Unauthenticated)
            }
            Err(source) => Err(TradingError::RemoteServiceFailure {
                step: 0,
                effect: "load trade history",
                source,
                snapshot: self.snapshot().await,
                refreshed: false,
            }),
        }
    }

    /// Like `execute`, but the result is dropped if the view behind `token` was unmounted
    /// while the transition ran. The transition itself always runs to completion.
    pub async fn execute_for(
        &self,
        token: &LivenessToken,
        action: TradeAction,
    ) -> Option<Result<Arc<Snapshot>, TradingError>> {
        let stock_id = action.stock_id();
        let result = self.execute(action).await;
        if !token.is_alive() {
            tracing::debug!(stock_id, "view unmounted; discarding transition result");
            return None;
        }
        Some(result)
    }

    /// Validate, plan and execute one action, then commit the re-fetched snapshot.
    #[tracing::instrument(
        skip(self, action),
        fields(action = action.name(), stock_id = action.stock_id())
    )]
    pub async fn execute(&self, action: TradeAction) -> Result<Arc<Snapshot>, TradingError> {
        let session = self.active_session().await?;
        let stock_id = action.stock_id();
        let stock = self
            .stock(stock_id)
            .ok_or_else(|| TradingError::StockNotFound(stock_id.to_string()))?;
        action.validate()?;

        let _guard = match self.contention {
            ContentionPolicy::Queue => self.locks.acquire(stock_id).await,
            ContentionPolicy::Reject => self
                .locks
                .try_acquire(stock_id)
                .ok_or_else(|| TradingError::Busy(stock.symbol.clone()))?,
        };

        if let Err(source) = self.reload_if_stale(&session).await {
            return Err(self.refresh_failure(source).await);
        }

        // Read after locking so a queued request plans against its predecessor's result.
        let snapshot = self.snapshot().await;
        let plan = {
            let holding = snapshot.holding(stock_id);
            let market_price = if action.needs_market_price() {
                self.market_price(&stock.symbol).await
            } else {
                None
            };
            transition::plan(holding, &stock.symbol, &action, market_price)?
        };

        if plan.is_noop() {
            tracing::debug!(state = %plan.from, "nothing to do");
            return Ok(snapshot);
        }

        tracing::info!(
            symbol = %stock.symbol,
            from = %plan.from,
            to = %plan.to,
            effects = plan.effects.len(),
            "executing transition"
        );

        for (step, effect) in plan.effects.iter().enumerate() {
            if let Err(source) = self.apply(&session, effect).await {
                return Err(self.abort(stock_id, step, effect.label(), source).await);
            }
            tracing::debug!(step, effect = effect.label(), "effect applied");
        }

        let committed = match self.reload_snapshot(&session).await {
            Ok(committed) => committed,
            Err(source) => {
                return Err(self
                    .abort(stock_id, plan.effects.len(), "refresh the portfolio", source)
                    .await);
            }
        };

        let reached = committed.state_of(stock_id);
        if reached != plan.to {
            tracing::warn!(
                symbol = %stock.symbol,
                expected = %plan.to,
                reached = %reached,
                "service state differs from the planned transition"
            );
        }
        Ok(committed)
    }

    /// Latest price for a market buy: fresh quote if possible, cached one otherwise.
    async fn market_price(&self, symbol: &str) -> Option<Price> {
        match self.service.get_quote(symbol).await {
            Ok(quote) => {
                let price = quote.price;
                self.quotes.insert(quote.clone());
                self.publish(PortfolioEvent::QuoteUpdated(quote));
                Some(price)
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, "quote unavailable; using last known price");
                self.quotes.get(symbol).map(|q| q.price)
            }
        }
    }

    async fn apply(&self, session: &Session, effect: &Effect) -> Result<(), RemoteError> {
        let service = self.service.as_ref();
        match effect {
            Effect::CreateOrIncreasePosition {
                stock_id,
                quantity,
                price,
            } => {
                service
                    .create_or_increase_position(session, *stock_id, *quantity, *price)
                    .await?;
            }
            Effect::DecreaseOrDeletePosition {
                position_id,
                quantity,
            } => {
                let change = service
                    .decrease_or_delete_position(session, *position_id, *quantity)
                    .await?;
                if change == PositionChange::Deleted {
                    tracing::debug!(position_id, "position closed");
                }
            }
            Effect::AddWatchlistEntry { stock_id, note } => {
                service
                    .add_watchlist_entry(session, *stock_id, note.as_deref())
                    .await?;
            }
            Effect::UpdateWatchlistNote { entry_id, note } => {
                service
                    .update_watchlist_note(session, *entry_id, note.as_deref())
                    .await?;
            }
            Effect::RemoveWatchlistEntry { entry_id } => {
                service.remove_watchlist_entry(session, *entry_id).await?;
            }
        }
        Ok(())
    }

    /// A remote call failed mid-transition: don't guess, re-fetch what the service has.
    async fn abort(
        &self,
        stock_id: StockId,
        step: usize,
        effect: &'static str,
        source: RemoteError,
    ) -> TradingError {
        if matches!(source, RemoteError::Unauthorized) {
            tracing::warn!(stock_id, step, "portfolio service rejected the session");
            // Earlier effects may have landed; nothing can be re-fetched without a session.
            if step > 0 {
                self.stale.store(true, Ordering::SeqCst);
            }
            self.drop_session().await;
            return TradingError::Unauthenticated;
        }

        tracing::warn!(stock_id, step, effect, error = %source, "transition failed");
        let session = self.session.read().await.clone();
        let (snapshot, refreshed) = match session {
            Some(session) => match self.reload_snapshot(&session).await {
                Ok(snapshot) => (snapshot, true),
                Err(e) => {
                    tracing::warn!(error = %e, "re-fetch after failure also failed");
                    (self.snapshot().await, false)
                }
            },
            None => (self.snapshot().await, false),
        };
        if !refreshed && step > 0 {
            self.stale.store(true, Ordering::SeqCst);
        }

        let error = TradingError::RemoteServiceFailure {
            step,
            effect,
            source,
            snapshot,
            refreshed,
        };
        self.publish(PortfolioEvent::TransitionFailed {
            stock_id,
            message: error.to_string(),
        });
        error
    }
}
