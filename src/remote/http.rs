use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::RemoteError;
use crate::remote::PortfolioService;
use crate::remote::wire::{
    AddWatchlistBody, CreatePositionBody, ErrorBody, NotesBody, PositionDto, QuoteDto,
    SellResponse, TradeDto, WatchlistDto, convert_all,
};
use crate::session::Session;
use crate::types::position::{Position, PositionChange};
use crate::types::quote::Quote;
use crate::types::stock::Stock;
use crate::types::trade::TradeRecord;
use crate::types::watchlist::WatchlistEntry;
use crate::types::{EntryId, PositionId, Price, Qty, StockId};

/// REST client for the portfolio service.
#[derive(Debug, Clone)]
pub struct HttpPortfolioService {
    client: Client,
    base_url: String,
}

impl HttpPortfolioService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
        request.bearer_auth(session.token())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = check_status(request.send().await?).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), RemoteError> {
        check_status(request.send().await?).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into a `RemoteError`, preferring the body's `detail`.
async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let detail = body
        .detail
        .or(body.message)
        .unwrap_or_else(|| format!("HTTP {}", status));
    tracing::debug!(
        status = status.as_u16(),
        detail = %detail,
        "portfolio service returned an error"
    );
    Err(RemoteError::from_status(status.as_u16(), detail))
}

#[async_trait]
impl PortfolioService for HttpPortfolioService {
    async fn list_positions(&self, session: &Session) -> Result<Vec<Position>, RemoteError> {
        let request = self.authed(self.client.get(self.url("/positions")), session);
        let dtos: Vec<PositionDto> = self.send_json(request).await?;
        convert_all(dtos)
    }

    async fn list_watchlist(&self, session: &Session) -> Result<Vec<WatchlistEntry>, RemoteError> {
        let request = self.authed(self.client.get(self.url("/watchlist")), session);
        let dtos: Vec<WatchlistDto> = self.send_json(request).await?;
        convert_all(dtos)
    }

    async fn create_or_increase_position(
        &self,
        session: &Session,
        stock_id: StockId,
        quantity: Qty,
        price: Price,
    ) -> Result<Position, RemoteError> {
        let request = self
            .authed(self.client.post(self.url("/positions")), session)
            .json(&CreatePositionBody {
                stock_id,
                quantity,
                purchase_price: price,
            });
        let dto: PositionDto = self.send_json(request).await?;
        Position::try_from(dto)
    }

    async fn decrease_or_delete_position(
        &self,
        session: &Session,
        position_id: PositionId,
        quantity: Qty,
    ) -> Result<PositionChange, RemoteError> {
        let request = self
            .authed(
                self.client
                    .post(self.url(&format!("/positions/{}/sell", position_id))),
                session,
            )
            .query(&[("quantity", quantity)]);
        match self.send_json::<SellResponse>(request).await? {
            SellResponse::Remaining(dto) => Ok(PositionChange::Remaining(Position::try_from(dto)?)),
            SellResponse::Closed { message } => {
                tracing::debug!(position_id, message = %message, "position closed");
                Ok(PositionChange::Deleted)
            }
        }
    }

    async fn add_watchlist_entry(
        &self,
        session: &Session,
        stock_id: StockId,
        note: Option<&str>,
    ) -> Result<WatchlistEntry, RemoteError> {
        let request = self
            .authed(self.client.post(self.url("/watchlist")), session)
            .json(&AddWatchlistBody {
                stock_id,
                notes: note,
            });
        let dto: WatchlistDto = self.send_json(request).await?;
        WatchlistEntry::try_from(dto)
    }

    async fn update_watchlist_note(
        &self,
        session: &Session,
        entry_id: EntryId,
        note: Option<&str>,
    ) -> Result<WatchlistEntry, RemoteError> {
        let request = self
            .authed(
                self.client.put(self.url(&format!("/watchlist/{}", entry_id))),
                session,
            )
            .json(&NotesBody { notes: note });
        let dto: WatchlistDto = self.send_json(request).await?;
        WatchlistEntry::try_from(dto)
    }

    async fn remove_watchlist_entry(
        &self,
        session: &Session,
        entry_id: EntryId,
    ) -> Result<(), RemoteError> {
        let request = self.authed(
            self.client
                .delete(self.url(&format!("/watchlist/{}", entry_id))),
            session,
        );
        self.send_empty(request).await
    }

    async fn list_stocks(&self, session: &Session) -> Result<Vec<Stock>, RemoteError> {
        let request = self.authed(self.client.get(self.url("/stocks")), session);
        self.send_json(request).await
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, RemoteError> {
        let request = self
            .client
            .get(self.url(&format!("/stocks/{}/quote", symbol.to_uppercase())));
        let dto: QuoteDto = self.send_json(request).await?;
        Ok(Quote::from(dto))
    }

    async fn list_trade_history(&self, session: &Session) -> Result<Vec<TradeRecord>, RemoteError> {
        let request = self.authed(self.client.get(self.url("/trade-history/")), session);
        let dtos: Vec<TradeDto> = self.send_json(request).await?;
        convert_all(dtos)
    }
}
