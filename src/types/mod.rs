//! Domain types shared by the state machine, the remote service and the CLI.

pub mod position;
pub mod quote;
pub mod stock;
pub mod trade;
pub mod watchlist;

pub type UserId = i64;
pub type StockId = i64;
pub type PositionId = i64;
pub type EntryId = i64;
pub type Qty = u64;
pub type Price = f64;
