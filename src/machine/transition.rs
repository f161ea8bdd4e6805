//! Pure transition planning: (holding, action) -> next state + ordered remote effects.
//! Nothing here performs I/O; the driver executes the effects.

use crate::error::TradingError;
use crate::machine::snapshot::{Holding, StockState};
use crate::types::{EntryId, PositionId, Price, Qty, StockId};

/// Note attached to the watchlist entry created when a position is sold out.
pub const SOLD_OUT_NOTE: &str = "sold out";

#[derive(Debug, Clone, PartialEq)]
pub enum TradeAction {
    Buy {
        stock_id: StockId,
        quantity: i64,
        /// Execution price; the latest quote is used when absent.
        price: Option<Price>,
    },
    Sell {
        stock_id: StockId,
        quantity: i64,
    },
    Watch {
        stock_id: StockId,
        note: Option<String>,
    },
    Unwatch {
        stock_id: StockId,
    },
    Annotate {
        stock_id: StockId,
        note: Option<String>,
    },
}

impl TradeAction {
    pub fn stock_id(&self) -> StockId {
        match self {
            TradeAction::Buy { stock_id, .. }
            | TradeAction::Sell { stock_id, .. }
            | TradeAction::Watch { stock_id, .. }
            | TradeAction::Unwatch { stock_id }
            | TradeAction::Annotate { stock_id, .. } => *stock_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TradeAction::Buy { .. } => "buy",
            TradeAction::Sell { .. } => "sell",
            TradeAction::Watch { .. } => "watch",
            TradeAction::Unwatch { .. } => "unwatch",
            TradeAction::Annotate { .. } => "annotate",
        }
    }

    /// Checks that need no state: quantities and explicit prices.
    pub fn validate(&self) -> Result<(), TradingError> {
        match self {
            TradeAction::Buy { quantity, price, .. } => {
                validate_quantity(*quantity)?;
                if let Some(price) = price {
                    validate_price(*price)?;
                }
                Ok(())
            }
            TradeAction::Sell { quantity, .. } => validate_quantity(*quantity).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// A buy without an explicit price executes at the market.
    pub fn needs_market_price(&self) -> bool {
        matches!(self, TradeAction::Buy { price: None, .. })
    }
}

/// One mutating call against the portfolio service.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CreateOrIncreasePosition {
        stock_id: StockId,
        quantity: Qty,
        price: Price,
    },
    DecreaseOrDeletePosition {
        position_id: PositionId,
        quantity: Qty,
    },
    AddWatchlistEntry {
        stock_id: StockId,
        note: Option<String>,
    },
    UpdateWatchlistNote {
        entry_id: EntryId,
        note: Option<String>,
    },
    RemoveWatchlistEntry {
        entry_id: EntryId,
    },
}

impl Effect {
    pub fn label(&self) -> &'static str {
        match self {
            Effect::CreateOrIncreasePosition { .. } => "create or increase position",
            Effect::DecreaseOrDeletePosition { .. } => "decrease position",
            Effect::AddWatchlistEntry { .. } => "add watchlist entry",
            Effect::UpdateWatchlistNote { .. } => "update watchlist note",
            Effect::RemoveWatchlistEntry { .. } => "remove watchlist entry",
        }
    }
}

/// The planned transition. `quantity`/`average_price` describe the expected
/// position afterwards (0 / None when nothing is held).
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub stock_id: StockId,
    pub from: StockState,
    pub to: StockState,
    pub quantity: Qty,
    pub average_price: Option<Price>,
    pub effects: Vec<Effect>,
}

impl Plan {
    fn unchanged(stock_id: StockId, holding: Holding<'_>) -> Self {
        let (quantity, average_price) = match holding {
            Holding::Held { position, .. } => (position.quantity, Some(position.average_price)),
            _ => (0, None),
        };
        Self {
            stock_id,
            from: holding.state(),
            to: holding.state(),
            quantity,
            average_price,
            effects: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }
}

pub fn validate_quantity(quantity: i64) -> Result<Qty, TradingError> {
    if quantity <= 0 {
        return Err(TradingError::InvalidQuantity(quantity.to_string()));
    }
    Ok(quantity as Qty)
}

pub fn validate_price(price: Price) -> Result<Price, TradingError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(TradingError::InvalidPrice(price));
    }
    Ok(price)
}

/// Parse user input into a share count. Fractions, signs and zero are rejected.
pub fn parse_quantity(raw: &str) -> Result<Qty, TradingError> {
    let trimmed = raw.trim();
    let parsed: i64 = trimmed
        .parse()
        .map_err(|_| TradingError::InvalidQuantity(trimmed.to_string()))?;
    validate_quantity(parsed)
}

/// Quantity-weighted mean of the held lot and the new lot.
pub fn weighted_average(held: Qty, held_price: Price, added: Qty, added_price: Price) -> Price {
    let total = (held + added) as f64;
    (held as f64 * held_price + added as f64 * added_price) / total
}

/// Plan `action` against the current `holding` of one stock.
/// `market_price` is only consulted for buys without an explicit price.
pub fn plan(
    holding: Holding<'_>,
    symbol: &str,
    action: &TradeAction,
    market_price: Option<Price>,
) -> Result<Plan, TradingError> {
    action.validate()?;
    let stock_id = action.stock_id();

    match action {
        TradeAction::Buy {
            quantity, price, ..
        } => {
            let quantity = validate_quantity(*quantity)?;
            let price = match price {
                Some(price) => *price,
                None => market_price
                    .filter(|p| p.is_finite() && *p > 0.0)
                    .ok_or_else(|| TradingError::PriceUnavailable(symbol.to_string()))?,
            };
            plan_buy(holding, stock_id, quantity, price)
        }
        TradeAction::Sell { quantity, .. } => {
            let quantity = validate_quantity(*quantity)?;
            plan_sell(holding, stock_id, symbol, quantity)
        }
        TradeAction::Watch { note, .. } => match holding {
            Holding::Untracked => Ok(Plan {
                stock_id,
                from: StockState::Untracked,
                to: StockState::Watching,
                quantity: 0,
                average_price: None,
                effects: vec![Effect::AddWatchlistEntry {
                    stock_id,
                    note: note.clone(),
                }],
            }),
            // Already watched: keep the single existing entry.
            Holding::Watching(_) => Ok(Plan::unchanged(stock_id, holding)),
            Holding::Held { .. } => Err(TradingError::ConflictingState {
                symbol: symbol.to_string(),
                action: "added to the watchlist",
            }),
        },
        TradeAction::Unwatch { .. } => match holding {
            Holding::Watching(entry) => Ok(Plan {
                stock_id,
                from: StockState::Watching,
                to: StockState::Untracked,
                quantity: 0,
                average_price: None,
                effects: vec![Effect::RemoveWatchlistEntry { entry_id: entry.id }],
            }),
            Holding::Untracked => Ok(Plan::unchanged(stock_id, holding)),
            Holding::Held { .. } => Err(TradingError::ConflictingState {
                symbol: symbol.to_string(),
                action: "removed from the watchlist",
            }),
        },
        TradeAction::Annotate { note, .. } => match holding {
            Holding::Watching(entry) => Ok(Plan {
                stock_id,
                from: StockState::Watching,
                to: StockState::Watching,
                quantity: 0,
                average_price: None,
                effects: vec![Effect::UpdateWatchlistNote {
                    entry_id: entry.id,
                    note: note.clone(),
                }],
            }),
            Holding::Untracked => Err(TradingError::NotWatching(symbol.to_string())),
            Holding::Held { .. } => Err(TradingError::ConflictingState {
                symbol: symbol.to_string(),
                action: "annotated on the watchlist",
            }),
        },
    }
}

fn plan_buy(
    holding: Holding<'_>,
    stock_id: StockId,
    quantity: Qty,
    price: Price,
) -> Result<Plan, TradingError> {
    let create = Effect::CreateOrIncreasePosition {
        stock_id,
        quantity,
        price,
    };

    let plan = match holding {
        Holding::Untracked => Plan {
            stock_id,
            from: StockState::Untracked,
            to: StockState::Held,
            quantity,
            average_price: Some(price),
            effects: vec![create],
        },
        // Position first: a failure between the two calls leaves the stock held, not lost.
        Holding::Watching(entry) => Plan {
            stock_id,
            from: StockState::Watching,
            to: StockState::Held,
            quantity,
            average_price: Some(price),
            effects: vec![create, Effect::RemoveWatchlistEntry { entry_id: entry.id }],
        },
        Holding::Held { position, shadowed } => {
            let total = position
                .quantity
                .checked_add(quantity)
                .ok_or_else(|| TradingError::InvalidQuantity(quantity.to_string()))?;
            let mut effects = vec![create];
            if let Some(entry) = shadowed {
                effects.push(Effect::RemoveWatchlistEntry { entry_id: entry.id });
            }
            Plan {
                stock_id,
                from: StockState::Held,
                to: StockState::Held,
                quantity: total,
                average_price: Some(weighted_average(
                    position.quantity,
                    position.average_price,
                    quantity,
                    price,
                )),
                effects,
            }
        }
    };
    Ok(plan)
}

fn plan_sell(
    holding: Holding<'_>,
    stock_id: StockId,
    symbol: &str,
    quantity: Qty,
) -> Result<Plan, TradingError> {
    let (position, shadowed) = match holding {
        Holding::Held { position, shadowed } => (position, shadowed),
        Holding::Untracked | Holding::Watching(_) => {
            return Err(TradingError::NotOwned(symbol.to_string()));
        }
    };

    if quantity > position.quantity {
        return Err(TradingError::InsufficientShares {
            symbol: symbol.to_string(),
            requested: quantity,
            held: position.quantity,
        });
    }

    let decrease = Effect::DecreaseOrDeletePosition {
        position_id: position.id,
        quantity,
    };

    if quantity < position.quantity {
        // Selling keeps the average cost of the remaining shares.
        return Ok(Plan {
            stock_id,
            from: StockState::Held,
            to: StockState::Held,
            quantity: position.quantity - quantity,
            average_price: Some(position.average_price),
            effects: vec![decrease],
        });
    }

    let mut effects = vec![decrease];
    // A shadowed entry becomes visible once the position is gone; don't create a second one.
    if shadowed.is_none() {
        effects.push(Effect::AddWatchlistEntry {
            stock_id,
            note: Some(SOLD_OUT_NOTE.to_string()),
        });
    }
    Ok(Plan {
        stock_id,
        from: StockState::Held,
        to: StockState::Watching,
        quantity: 0,
        average_price: None,
        effects,
    })
}
