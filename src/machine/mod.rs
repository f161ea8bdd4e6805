//! Client-side trading state machine: per-stock Untracked / Watching / Held.

pub mod driver;
pub mod events;
pub mod liveness;
pub mod locks;
pub mod quotes;
pub mod snapshot;
pub mod transition;

pub use driver::{MachineOptions, TradingStateMachine};
pub use events::PortfolioEvent;
pub use liveness::{LivenessToken, ViewLifetime};
pub use locks::{ContentionPolicy, StockLocks};
pub use quotes::QuoteBook;
pub use snapshot::{Holding, Snapshot, StockState};
pub use transition::{Effect, Plan, SOLD_OUT_NOTE, TradeAction, plan};
