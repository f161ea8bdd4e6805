//! Latest known quotes. Refreshes are best-effort and may race with transitions.

use dashmap::DashMap;
use futures::future::join_all;

use crate::remote::PortfolioService;
use crate::types::quote::Quote;

#[derive(Debug, Default)]
pub struct QuoteBook {
    quotes: DashMap<String, Quote>,
}

impl QuoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<Quote> {
        self.quotes.get(&symbol.to_uppercase()).map(|q| q.value().clone())
    }

    pub fn insert(&self, quote: Quote) {
        self.quotes.insert(quote.symbol.to_uppercase(), quote);
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Fetch quotes for `symbols` concurrently. Failed symbols keep their previous quote.
    pub async fn refresh(&self, service: &dyn PortfolioService, symbols: &[String]) -> Vec<Quote> {
        let results = join_all(symbols.iter().map(|symbol| async move {
            (symbol, service.get_quote(symbol).await)
        }))
        .await;

        let mut fresh = Vec::with_capacity(results.len());
        for (symbol, result) in results {
            match result {
                Ok(quote) => {
                    self.insert(quote.clone());
                    fresh.push(quote);
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "quote refresh failed");
                }
            }
        }
        fresh
    }
}
