//! Client for the brapi.dev market-data API.
//!
//! Thin wrapper over the `/api/quote/{ticker}` endpoint: quotes, trailing
//! cash dividends, current prices and a per-ticker trailing-year yield.
//! Some tickers are served without a token; for the rest a free token from
//! <https://brapi.dev> must be configured. The client performs no retries —
//! retry policy belongs to the caller.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode, Url};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Deserialize;
use thiserror::Error;

/// Tickers brapi.dev serves without an API token.
pub const FREE_TICKERS: [&str; 4] = ["PETR4", "MGLU3", "VALE3", "ITUB4"];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for the brapi.dev client.
///
/// Env vars: `BRAPI_BASE_URL` (default `https://brapi.dev/api/`) and
/// `BRAPI_TOKEN` (optional).
#[derive(Debug, Clone)]
pub struct BrapiConfig {
    pub base_url: String,
    pub token: Option<String>,
}

impl BrapiConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("BRAPI_BASE_URL")
            .unwrap_or_else(|_| "https://brapi.dev/api/".to_string());
        let token = std::env::var("BRAPI_TOKEN").ok().filter(|t| !t.is_empty());
        Self { base_url, token }
    }
}

#[derive(Debug, Error)]
pub enum BrapiError {
    #[error("invalid brapi base url '{0}'")]
    InvalidBaseUrl(String),

    #[error("ticker {0} requires a brapi.dev token; free tickers: PETR4, MGLU3, VALE3, ITUB4")]
    TokenRequired(String),

    #[error("ticker {0} not found")]
    TickerNotFound(String),

    #[error("brapi returned an error for {ticker}: {message}")]
    Api { ticker: String, message: String },

    #[error("no quote data in brapi response for {0}")]
    EmptyResponse(String),

    #[error("request to brapi failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One normalized cash dividend payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DividendPayment {
    pub payment_date: NaiveDate,
    pub amount_per_share: Decimal,
}

/// Company metadata extracted from a quote.
#[derive(Debug, Clone)]
pub struct CompanyInfo {
    pub name: String,
    pub sector: Option<String>,
    pub country: String,
}

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(default)]
    results: Option<Vec<QuoteResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

impl QuoteEnvelope {
    fn error_message(&self) -> Option<String> {
        if self.error.is_none() && self.message.is_none() {
            return None;
        }
        Some(
            self.message
                .clone()
                .or_else(|| self.error.as_ref().map(ToString::to_string))
                .unwrap_or_else(|| "unknown error".to_string()),
        )
    }
}

/// Raw quote payload, `results[0]` of the envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResult {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default, rename = "longName")]
    pub long_name: Option<String>,
    #[serde(default, rename = "shortName")]
    pub short_name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default, rename = "regularMarketPrice")]
    pub regular_market_price: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default, rename = "dividendsData")]
    pub dividends_data: Option<DividendsData>,
}

/// brapi has shipped two shapes for `dividendsData`: an object holding
/// `cashDividends` and, historically, a bare list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DividendsData {
    Structured {
        #[serde(default, rename = "cashDividends")]
        cash_dividends: Vec<RawCashDividend>,
    },
    Legacy(Vec<RawLegacyDividend>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCashDividend {
    #[serde(default, rename = "paymentDate")]
    pub payment_date: Option<String>,
    #[serde(default)]
    pub rate: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLegacyDividend {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub dividend: Option<Decimal>,
}

impl QuoteResult {
    pub fn company_name(&self) -> Option<String> {
        self.long_name
            .clone()
            .or_else(|| self.short_name.clone())
            .filter(|name| !name.is_empty())
    }

    /// `regularMarketPrice` with `price` as fallback; non-positive values
    /// are treated as missing.
    pub fn current_price(&self) -> Option<Decimal> {
        self.regular_market_price
            .or(self.price)
            .filter(|price| *price > Decimal::ZERO)
    }

    /// Cash dividends normalized to (date, amount) pairs. Entries without a
    /// parsable date or a positive amount are dropped.
    pub fn cash_dividends(&self) -> Vec<DividendPayment> {
        match &self.dividends_data {
            None => Vec::new(),
            Some(DividendsData::Structured { cash_dividends }) => cash_dividends
                .iter()
                .filter_map(|raw| to_payment(raw.payment_date.as_deref(), raw.rate))
                .collect(),
            Some(DividendsData::Legacy(entries)) => entries
                .iter()
                .filter_map(|raw| to_payment(raw.date.as_deref(), raw.dividend))
                .collect(),
        }
    }
}

fn to_payment(date: Option<&str>, amount: Option<Decimal>) -> Option<DividendPayment> {
    let payment_date = parse_payment_date(date?)?;
    let amount_per_share = amount?;
    if amount_per_share <= Decimal::ZERO {
        return None;
    }
    Some(DividendPayment {
        payment_date,
        amount_per_share,
    })
}

/// ISO-8601 timestamps are truncated to their date part.
fn parse_payment_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.split('T').next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

#[derive(Debug, Clone)]
pub struct BrapiClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl BrapiClient {
    pub fn new(config: BrapiConfig) -> Result<Self, BrapiError> {
        // A trailing slash matters: Url::join drops the last segment without it
        let normalized = if config.base_url.ends_with('/') {
            config.base_url.clone()
        } else {
            format!("{}/", config.base_url)
        };
        let base_url =
            Url::parse(&normalized).map_err(|_| BrapiError::InvalidBaseUrl(config.base_url))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: config.token,
        })
    }

    /// Fetches the quote for `ticker`, optionally including dividend history
    /// over `range` (e.g. `1y`).
    pub async fn get_quote(
        &self,
        ticker: &str,
        range: &str,
        dividends: bool,
    ) -> Result<QuoteResult, BrapiError> {
        let ticker = normalize_ticker(ticker);
        let url = self
            .base_url
            .join(&format!("quote/{ticker}"))
            .map_err(|_| BrapiError::InvalidBaseUrl(self.base_url.to_string()))?;

        let mut request = self.http.get(url).query(&[
            ("range", range),
            ("dividends", if dividends { "true" } else { "false" }),
        ]);
        if let Some(token) = &self.token {
            request = request.query(&[("token", token.as_str())]);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => {
                if FREE_TICKERS.contains(&ticker.as_str()) {
                    return Err(BrapiError::Api {
                        ticker,
                        message: "authentication rejected for a free ticker".to_string(),
                    });
                }
                return Err(BrapiError::TokenRequired(ticker));
            }
            StatusCode::NOT_FOUND => return Err(BrapiError::TickerNotFound(ticker)),
            status if !status.is_success() => {
                let message = response
                    .json::<QuoteEnvelope>()
                    .await
                    .ok()
                    .and_then(|body| body.error_message())
                    .unwrap_or_else(|| format!("HTTP {status}"));
                return Err(BrapiError::Api { ticker, message });
            }
            _ => {}
        }

        let envelope: QuoteEnvelope = response.json().await?;
        if let Some(message) = envelope.error_message() {
            return Err(BrapiError::Api { ticker, message });
        }
        envelope
            .results
            .into_iter()
            .flatten()
            .next()
            .ok_or(BrapiError::EmptyResponse(ticker))
    }

    /// Cash dividends paid over `range`, most payloads covering the trailing
    /// year.
    pub async fn get_dividends(
        &self,
        ticker: &str,
        range: &str,
    ) -> Result<Vec<DividendPayment>, BrapiError> {
        let quote = self.get_quote(ticker, range, true).await?;
        Ok(quote.cash_dividends())
    }

    pub async fn get_current_price(&self, ticker: &str) -> Result<Option<Decimal>, BrapiError> {
        let quote = self.get_quote(ticker, "1d", false).await?;
        Ok(quote.current_price())
    }

    /// Trailing-year dividend yield percentage: payouts over the current
    /// price, times 100, rounded to 2 decimal places. `None` when the quote
    /// lacks a usable price or any dividends.
    pub async fn trailing_yield(&self, ticker: &str) -> Result<Option<Decimal>, BrapiError> {
        let quote = self.get_quote(ticker, "1y", true).await?;
        let Some(price) = quote.current_price() else {
            tracing::warn!(ticker, "quote has no usable price, skipping yield");
            return Ok(None);
        };
        let total: Decimal = quote
            .cash_dividends()
            .iter()
            .map(|payment| payment.amount_per_share)
            .sum();
        if total <= Decimal::ZERO {
            return Ok(None);
        }
        let yield_pct = (total / price * dec!(100))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Ok(Some(yield_pct))
    }

    /// Company name, sector and country for `ticker`. brapi covers B3, so
    /// the country is always Brasil.
    pub async fn company_info(&self, ticker: &str) -> Result<CompanyInfo, BrapiError> {
        let ticker = normalize_ticker(ticker);
        let quote = self.get_quote(&ticker, "1d", false).await?;
        Ok(CompanyInfo {
            name: quote.company_name().unwrap_or_default(),
            sector: quote.sector.clone().filter(|s| !s.is_empty()),
            country: "Brasil".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cash_dividends_structured_payload() {
        let raw = r#"{
            "symbol": "PETR4",
            "regularMarketPrice": 38.52,
            "dividendsData": {
                "cashDividends": [
                    {"paymentDate": "2024-01-15T00:00:00.000Z", "rate": 0.50},
                    {"paymentDate": "2024-04-10", "rate": 0.35},
                    {"paymentDate": "not-a-date", "rate": 0.20},
                    {"paymentDate": "2024-06-01T00:00:00.000Z", "rate": 0}
                ]
            }
        }"#;
        let quote: QuoteResult = serde_json::from_str(raw).unwrap();
        let payments = quote.cash_dividends();

        assert_eq!(payments.len(), 2);
        assert_eq!(
            payments[0].payment_date,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert_eq!(payments[0].amount_per_share, dec!(0.50));
        assert_eq!(payments[1].amount_per_share, dec!(0.35));
    }

    #[test]
    fn test_cash_dividends_legacy_payload() {
        let raw = r#"{
            "symbol": "VALE3",
            "dividendsData": [
                {"date": "2023-11-20", "dividend": 1.75},
                {"date": "2023-05-02", "dividend": 0}
            ]
        }"#;
        let quote: QuoteResult = serde_json::from_str(raw).unwrap();
        let payments = quote.cash_dividends();

        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount_per_share, dec!(1.75));
    }

    #[test]
    fn test_cash_dividends_absent_payload() {
        let quote: QuoteResult = serde_json::from_str(r#"{"symbol": "ITUB4"}"#).unwrap();
        assert!(quote.cash_dividends().is_empty());
    }

    #[test]
    fn test_current_price_falls_back_to_price_field() {
        let quote: QuoteResult =
            serde_json::from_str(r#"{"symbol": "MGLU3", "price": 2.15}"#).unwrap();
        assert_eq!(quote.current_price(), Some(dec!(2.15)));

        let quote: QuoteResult =
            serde_json::from_str(r#"{"symbol": "MGLU3", "regularMarketPrice": 0}"#).unwrap();
        assert_eq!(quote.current_price(), None);
    }

    #[test]
    fn test_company_name_prefers_long_name() {
        let quote: QuoteResult = serde_json::from_str(
            r#"{"longName": "Petróleo Brasileiro S.A.", "shortName": "PETROBRAS"}"#,
        )
        .unwrap();
        assert_eq!(
            quote.company_name().as_deref(),
            Some("Petróleo Brasileiro S.A.")
        );

        let quote: QuoteResult =
            serde_json::from_str(r#"{"shortName": "PETROBRAS"}"#).unwrap();
        assert_eq!(quote.company_name().as_deref(), Some("PETROBRAS"));
    }

    #[test]
    fn test_envelope_error_message() {
        let envelope: QuoteEnvelope =
            serde_json::from_str(r#"{"error": true, "message": "ticker inválido"}"#).unwrap();
        assert_eq!(envelope.error_message().as_deref(), Some("ticker inválido"));

        let envelope: QuoteEnvelope = serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert_eq!(envelope.error_message(), None);
    }

    #[test]
    fn test_normalize_ticker() {
        assert_eq!(normalize_ticker(" petr4 "), "PETR4");
    }
}
