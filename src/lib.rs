pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod machine;
pub mod remote;
pub mod session;
pub mod types;
pub mod valuation;

pub use error::{RemoteError, TradingError};
pub use machine::{TradeAction, TradingStateMachine};
pub use session::Session;
