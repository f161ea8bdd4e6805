use std::sync::Arc;

use crate::machine::snapshot::Snapshot;
use crate::types::quote::Quote;
use crate::types::StockId;

/// Broadcast to every subscribed view.
#[derive(Debug, Clone)]
pub enum PortfolioEvent {
    SnapshotCommitted(Arc<Snapshot>),
    QuoteUpdated(Quote),
    TransitionFailed { stock_id: StockId, message: String },
    SessionExpired,
}
