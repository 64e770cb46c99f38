//! In-memory data source.
//!
//! Serves fixtures registered up front. Used by tests and by offline
//! FinanceQL sessions; anything not registered reports "no data", which
//! exercises the same degraded paths a flaky network source would.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{
    Bar, DataSource, Financials, NewsItem, OptionChain, Quote, StockProfile, Timeframe,
};

#[derive(Default)]
pub struct StaticDataSource {
    quotes: RwLock<HashMap<String, Quote>>,
    history: RwLock<HashMap<String, Vec<Bar>>>,
    financials: RwLock<HashMap<String, Financials>>,
    chains: RwLock<HashMap<String, OptionChain>>,
    profiles: RwLock<HashMap<String, StockProfile>>,
    news: RwLock<HashMap<String, Vec<NewsItem>>>,
}

impl StaticDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_quote(&self, quote: Quote) {
        self.quotes.write().unwrap().insert(quote.ticker.to_uppercase(), quote);
    }

    pub fn insert_history(&self, ticker: &str, bars: Vec<Bar>) {
        self.history.write().unwrap().insert(ticker.to_uppercase(), bars);
    }

    pub fn insert_financials(&self, financials: Financials) {
        self.financials
            .write()
            .unwrap()
            .insert(financials.ticker.to_uppercase(), financials);
    }

    pub fn insert_option_chain(&self, chain: OptionChain) {
        self.chains.write().unwrap().insert(chain.ticker.to_uppercase(), chain);
    }

    pub fn insert_profile(&self, profile: StockProfile) {
        self.profiles.write().unwrap().insert(profile.ticker.to_uppercase(), profile);
    }

    pub fn insert_news(&self, ticker: &str, items: Vec<NewsItem>) {
        self.news.write().unwrap().insert(ticker.to_uppercase(), items);
    }
}

#[async_trait]
impl DataSource for StaticDataSource {
    async fn get_quote(&self, ticker: &str) -> anyhow::Result<Quote> {
        self.quotes
            .read()
            .unwrap()
            .get(&ticker.to_uppercase())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no quote for {ticker}"))
    }

    async fn get_historical(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
        _timeframe: Timeframe,
    ) -> anyhow::Result<Vec<Bar>> {
        let all = self
            .history
            .read()
            .unwrap()
            .get(&ticker.to_uppercase())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no history for {ticker}"))?;
        Ok(all
            .into_iter()
            .filter(|b| {
                let d = b.date();
                d >= from && d <= to
            })
            .collect())
    }

    async fn get_financials(&self, ticker: &str) -> anyhow::Result<Financials> {
        self.financials
            .read()
            .unwrap()
            .get(&ticker.to_uppercase())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no financials for {ticker}"))
    }

    async fn get_option_chain(
        &self,
        ticker: &str,
        _expiry: Option<NaiveDate>,
    ) -> anyhow::Result<OptionChain> {
        self.chains
            .read()
            .unwrap()
            .get(&ticker.to_uppercase())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no option chain for {ticker}"))
    }

    async fn get_stock_profile(&self, ticker: &str) -> anyhow::Result<StockProfile> {
        self.profiles
            .read()
            .unwrap()
            .get(&ticker.to_uppercase())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no profile for {ticker}"))
    }

    async fn get_news(&self, ticker: &str, limit: usize) -> anyhow::Result<Vec<NewsItem>> {
        let items = self
            .news
            .read()
            .unwrap()
            .get(&ticker.to_uppercase())
            .cloned()
            .unwrap_or_default();
        Ok(items.into_iter().take(limit).collect())
    }
}
