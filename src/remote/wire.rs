//! JSON shapes of the portfolio service's REST API and their conversion to domain types.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::types::position::Position;
use crate::types::quote::Quote;
use crate::types::trade::{TradeRecord, TradeSide};
use crate::types::watchlist::WatchlistEntry;
use crate::types::{EntryId, PositionId, Price, Qty, StockId, UserId};

#[derive(Debug, Deserialize)]
pub(crate) struct StockRef {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PositionDto {
    pub id: PositionId,
    pub user_id: UserId,
    pub stock_id: StockId,
    pub stock: StockRef,
    pub quantity: f64,
    pub purchase_price: f64,
    pub purchase_date: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WatchlistDto {
    pub id: EntryId,
    pub user_id: UserId,
    pub stock_id: StockId,
    pub stock: StockRef,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(alias = "added_date")]
    pub date_added: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuoteDto {
    pub symbol: String,
    pub current_price: f64,
    #[serde(default)]
    pub change: f64,
    #[serde(default)]
    pub percent_change: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TradeDto {
    pub id: i64,
    pub trade_type: String,
    pub quantity: f64,
    pub price_per_share: f64,
    pub total_amount: f64,
    pub trade_date: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub stock: StockRef,
}

/// `POST /positions/{id}/sell` answers with the remaining position, or a message once closed.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SellResponse {
    Remaining(PositionDto),
    Closed { message: String },
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePositionBody {
    pub stock_id: StockId,
    pub quantity: Qty,
    pub purchase_price: Price,
}

#[derive(Debug, Serialize)]
pub(crate) struct AddWatchlistBody<'a> {
    pub stock_id: StockId,
    pub notes: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NotesBody<'a> {
    pub notes: Option<&'a str>,
}

/// The service stores share counts as floats; anything fractional is a contract violation.
pub(crate) fn to_qty(value: f64) -> Result<Qty, RemoteError> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(RemoteError::Decode(format!(
            "quantity {} is not a whole share count",
            value
        )));
    }
    Ok(value as Qty)
}

/// Accepts RFC 3339 as well as the naive UTC timestamps the service emits.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RemoteError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| RemoteError::Decode(format!("bad timestamp '{}': {}", raw, e)))
}

impl TryFrom<PositionDto> for Position {
    type Error = RemoteError;

    fn try_from(dto: PositionDto) -> Result<Self, Self::Error> {
        Ok(Position {
            id: dto.id,
            user_id: dto.user_id,
            stock_id: dto.stock_id,
            symbol: dto.stock.symbol.to_uppercase(),
            quantity: to_qty(dto.quantity)?,
            average_price: dto.purchase_price,
            purchased_at: parse_timestamp(&dto.purchase_date)?,
        })
    }
}

impl TryFrom<WatchlistDto> for WatchlistEntry {
    type Error = RemoteError;

    fn try_from(dto: WatchlistDto) -> Result<Self, Self::Error> {
        Ok(WatchlistEntry {
            id: dto.id,
            user_id: dto.user_id,
            stock_id: dto.stock_id,
            symbol: dto.stock.symbol.to_uppercase(),
            note: dto.notes,
            added_at: parse_timestamp(&dto.date_added)?,
        })
    }
}

impl From<QuoteDto> for Quote {
    fn from(dto: QuoteDto) -> Self {
        Quote::new(&dto.symbol, dto.current_price, dto.change, dto.percent_change)
    }
}

impl TryFrom<TradeDto> for TradeRecord {
    type Error = RemoteError;

    fn try_from(dto: TradeDto) -> Result<Self, Self::Error> {
        let side = match dto.trade_type.to_uppercase().as_str() {
            "BUY" => TradeSide::Buy,
            "SELL" => TradeSide::Sell,
            other => {
                return Err(RemoteError::Decode(format!("unknown trade type '{}'", other)));
            }
        };
        Ok(TradeRecord {
            id: dto.id,
            side,
            name: dto.stock.name.unwrap_or_else(|| dto.stock.symbol.clone()),
            symbol: dto.stock.symbol.to_uppercase(),
            quantity: to_qty(dto.quantity)?,
            price_per_share: dto.price_per_share,
            total_amount: dto.total_amount,
            traded_at: parse_timestamp(&dto.trade_date)?,
            note: dto.notes,
        })
    }
}

/// Convert a list, failing on the first malformed element.
pub(crate) fn convert_all<D, T>(items: Vec<D>) -> Result<Vec<T>, RemoteError>
where
    T: TryFrom<D, Error = RemoteError>,
{
    items.into_iter().map(T::try_from).collect()
}
