//! Stock data tools backed by Yahoo Finance
//!
//! Every tool normalizes and validates its ticker before fetching data, so an
//! unknown symbol surfaces as a validation error instead of an empty table.

use super::{optional_usize, require_str, Tool};
use crate::error::{details, AgentError, FinancialAgentError};
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const MAX_TICKER_LEN: usize = 12;
const DEFAULT_NEWS_STORIES: usize = 3;
const USER_AGENT: &str = "Mozilla/5.0 (compatible; financial-agent-system/0.1)";

/// Which stock capabilities to expose to the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockToolOptions {
    pub stock_price: bool,
    pub analyst_recommendations: bool,
    pub stock_fundamentals: bool,
    pub company_news: bool,
}

impl StockToolOptions {
    pub fn all() -> Self {
        Self {
            stock_price: true,
            analyst_recommendations: true,
            stock_fundamentals: true,
            company_news: true,
        }
    }
}

impl Default for StockToolOptions {
    fn default() -> Self {
        Self {
            stock_price: true,
            analyst_recommendations: false,
            stock_fundamentals: false,
            company_news: false,
        }
    }
}

/// Trim, uppercase and sanity-check a ticker symbol
pub fn normalize_ticker(raw: &str) -> Result<String> {
    let symbol = raw.trim().trim_start_matches('$').to_uppercase();

    let valid_chars = symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));

    if symbol.is_empty() || symbol.len() > MAX_TICKER_LEN || !valid_chars {
        return Err(invalid_ticker(raw.trim()).into());
    }

    Ok(symbol)
}

fn invalid_ticker(ticker: &str) -> FinancialAgentError {
    FinancialAgentError::validation(
        format!("Invalid ticker symbol: '{}'", ticker),
        details([
            ("ticker", json!(ticker)),
            ("suggestion", json!("Please verify the ticker symbol and try again")),
        ]),
    )
}

//
// ================= HTTP client =================
//

#[derive(Clone)]
pub struct YahooFinanceClient {
    client: Client,
    base_url: String,
    cookie_url: String,
    crumb: Arc<Mutex<Option<String>>>,
}

impl YahooFinanceClient {
    /// `cookie_url` is hit once to obtain the session cookie that the crumb is tied to
    pub fn new(base_url: &str, cookie_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Tool(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cookie_url: cookie_url.to_string(),
            crumb: Arc::new(Mutex::new(None)),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Yahoo Finance request");

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(AgentError::Api {
                status: status.as_u16(),
                message: upstream_error_message(&body)
                    .unwrap_or_else(|| format!("Yahoo Finance returned {} for {}", status, path)),
            });
        }

        decode_body(&response.text().await?, path)
    }

    /// Session crumb for quoteSummary, fetched on first use and cached
    async fn crumb(&self) -> Result<String> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        // Only the Set-Cookie matters here; the page itself is usually a 404.
        self.client.get(&self.cookie_url).send().await?;

        let response = self
            .client
            .get(format!("{}/v1/test/getcrumb", self.base_url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Api {
                status: status.as_u16(),
                message: format!("Yahoo Finance refused the crumb request ({})", status),
            });
        }

        let crumb = parse_crumb(&response.text().await?)
            .ok_or_else(|| AgentError::Tool("Yahoo Finance returned an unusable crumb".into()))?;
        debug!("Yahoo Finance crumb acquired");
        *cached = Some(crumb.clone());
        Ok(crumb)
    }

    async fn chart(&self, symbol: &str) -> Result<Value> {
        self.get_json(
            &format!("/v8/finance/chart/{}", symbol),
            &[("range", "1d".into()), ("interval", "1d".into())],
        )
        .await
    }

    async fn quote_summary(&self, symbol: &str, modules: &str) -> Result<Value> {
        let crumb = self.crumb().await?;
        let result = self
            .get_json(
                &format!("/v10/finance/quoteSummary/{}", symbol),
                &[("modules", modules.into()), ("crumb", crumb)],
            )
            .await;

        // An expired crumb is refreshed on the next call.
        if let Err(AgentError::Api { status: 401, .. }) = &result {
            self.crumb.lock().await.take();
        }
        result
    }

    /// Confirm that a ticker exists; returns the normalized symbol.
    pub async fn validate_ticker(&self, ticker: &str) -> Result<String> {
        let symbol = normalize_ticker(ticker)?;

        match self.chart(&symbol).await {
            Ok(body) => {
                parse_chart_quote(&body, &symbol)?;
                Ok(symbol)
            }
            Err(AgentError::Api { status: 404, .. }) => Err(invalid_ticker(&symbol).into()),
            Err(e @ AgentError::Tool(_)) => Err(e),
            Err(e) => Err(FinancialAgentError::validation(
                format!("Error validating ticker '{}'", symbol),
                details([
                    ("ticker", json!(symbol)),
                    ("original_error", json!(e.to_string())),
                    ("suggestion", json!("Please check the ticker symbol")),
                ]),
            )
            .into()),
        }
    }

    pub async fn current_price(&self, ticker: &str) -> Result<Value> {
        let symbol = normalize_ticker(ticker)?;
        match self.chart(&symbol).await {
            Ok(body) => parse_chart_quote(&body, &symbol),
            Err(AgentError::Api { status: 404, .. }) => Err(invalid_ticker(&symbol).into()),
            Err(e) => Err(e),
        }
    }

    pub async fn analyst_recommendations(&self, ticker: &str) -> Result<Value> {
        let symbol = self.validate_ticker(ticker).await?;
        let body = self.quote_summary(&symbol, "recommendationTrend").await?;
        parse_recommendations(&body, &symbol)
    }

    pub async fn fundamentals(&self, ticker: &str) -> Result<Value> {
        let symbol = self.validate_ticker(ticker).await?;
        let body = self
            .quote_summary(
                &symbol,
                "price,summaryDetail,defaultKeyStatistics,financialData,assetProfile",
            )
            .await?;
        parse_fundamentals(&body, &symbol)
    }

    pub async fn company_news(&self, ticker: &str, stories: usize) -> Result<Value> {
        let symbol = self.validate_ticker(ticker).await?;
        let body = self
            .get_json(
                "/v1/finance/search",
                &[
                    ("q", symbol.clone()),
                    ("quotesCount", "0".into()),
                    ("newsCount", stories.to_string()),
                ],
            )
            .await?;
        Ok(parse_news(&body, stories))
    }
}

//
// ================= Response parsing =================
//

fn decode_body(text: &str, path: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| {
        AgentError::Tool(format!(
            "Yahoo Finance returned a non-JSON response for {}: {}",
            path, e
        ))
    })
}

fn parse_crumb(body: &str) -> Option<String> {
    let crumb = body.trim();
    if crumb.is_empty() || crumb.contains('<') || crumb.contains(char::is_whitespace) {
        return None;
    }
    Some(crumb.to_string())
}

fn upstream_error_message(body: &Value) -> Option<String> {
    ["chart", "quoteSummary", "finance"]
        .iter()
        .filter_map(|root| body.get(root)?.get("error"))
        .find(|e| !e.is_null())
        .map(|e| {
            let code = e.get("code").and_then(Value::as_str).unwrap_or("Error");
            let desc = e.get("description").and_then(Value::as_str).unwrap_or("");
            format!("{}: {}", code, desc)
        })
}

/// Yahoo wraps numbers as `{"raw": 1.0, "fmt": "1.00"}`
fn raw(section: &Value, key: &str) -> Value {
    match section.get(key) {
        Some(Value::Object(obj)) => obj.get("raw").cloned().unwrap_or(Value::Null),
        Some(v @ (Value::Number(_) | Value::String(_))) => v.clone(),
        _ => Value::Null,
    }
}

fn first_result<'a>(body: &'a Value, root: &str) -> Option<&'a Value> {
    body.get(root)?.get("result")?.as_array()?.first()
}

pub fn parse_chart_quote(body: &Value, symbol: &str) -> Result<Value> {
    let meta = first_result(body, "chart")
        .and_then(|r| r.get("meta"))
        .filter(|m| m.get("symbol").and_then(Value::as_str).is_some())
        .ok_or_else(|| AgentError::from(invalid_ticker(symbol)))?;

    let price = raw(meta, "regularMarketPrice");
    let previous = raw(meta, "chartPreviousClose");
    let change_pct = match (price.as_f64(), previous.as_f64()) {
        (Some(p), Some(prev)) if prev != 0.0 => json!(((p - prev) / prev * 10000.0).round() / 100.0),
        _ => Value::Null,
    };

    Ok(json!({
        "symbol": meta["symbol"],
        "price": price,
        "previous_close": previous,
        "change_percent": change_pct,
        "currency": meta.get("currency").cloned().unwrap_or(Value::Null),
        "exchange": meta.get("exchangeName").cloned().unwrap_or(Value::Null),
    }))
}

pub fn parse_recommendations(body: &Value, symbol: &str) -> Result<Value> {
    let trend = first_result(body, "quoteSummary")
        .and_then(|r| r.get("recommendationTrend"))
        .and_then(|t| t.get("trend"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            AgentError::Tool(format!("No analyst recommendations available for {}", symbol))
        })?;

    let periods: Vec<Value> = trend
        .iter()
        .map(|p| {
            json!({
                "period": p.get("period").cloned().unwrap_or(Value::Null),
                "strong_buy": raw(p, "strongBuy"),
                "buy": raw(p, "buy"),
                "hold": raw(p, "hold"),
                "sell": raw(p, "sell"),
                "strong_sell": raw(p, "strongSell"),
            })
        })
        .collect();

    Ok(json!({ "symbol": symbol, "recommendations": periods }))
}

pub fn parse_fundamentals(body: &Value, symbol: &str) -> Result<Value> {
    let result = first_result(body, "quoteSummary").ok_or_else(|| {
        AgentError::Tool(format!("No fundamentals available for {}", symbol))
    })?;

    let empty = Value::Object(Map::new());
    let section = |name: &str| result.get(name).unwrap_or(&empty);
    let price = section("price");
    let summary = section("summaryDetail");
    let stats = section("defaultKeyStatistics");
    let financial = section("financialData");
    let profile = section("assetProfile");

    let company_name = price
        .get("longName")
        .or_else(|| price.get("shortName"))
        .cloned()
        .unwrap_or(Value::Null);

    Ok(json!({
        "symbol": symbol,
        "company_name": company_name,
        "sector": profile.get("sector").cloned().unwrap_or(Value::Null),
        "industry": profile.get("industry").cloned().unwrap_or(Value::Null),
        "market_cap": raw(price, "marketCap"),
        "pe_ratio": raw(summary, "trailingPE"),
        "forward_pe": raw(summary, "forwardPE"),
        "pb_ratio": raw(stats, "priceToBook"),
        "dividend_yield": raw(summary, "dividendYield"),
        "eps": raw(stats, "trailingEps"),
        "beta": raw(summary, "beta"),
        "52_week_high": raw(summary, "fiftyTwoWeekHigh"),
        "52_week_low": raw(summary, "fiftyTwoWeekLow"),
        "total_revenue": raw(financial, "totalRevenue"),
        "profit_margins": raw(financial, "profitMargins"),
        "return_on_equity": raw(financial, "returnOnEquity"),
        "debt_to_equity": raw(financial, "debtToEquity"),
        "target_mean_price": raw(financial, "targetMeanPrice"),
        "recommendation": financial.get("recommendationKey").cloned().unwrap_or(Value::Null),
    }))
}

pub fn parse_news(body: &Value, stories: usize) -> Value {
    let items: Vec<Value> = body
        .get("news")
        .and_then(Value::as_array)
        .map(|news| {
            news.iter()
                .take(stories)
                .map(|n| {
                    let published = n
                        .get("providerPublishTime")
                        .and_then(Value::as_i64)
                        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
                        .map(|dt| json!(dt.to_rfc3339()))
                        .unwrap_or(Value::Null);
                    json!({
                        "title": n.get("title").cloned().unwrap_or(Value::Null),
                        "publisher": n.get("publisher").cloned().unwrap_or(Value::Null),
                        "link": n.get("link").cloned().unwrap_or(Value::Null),
                        "published_at": published,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Value::Array(items)
}

//
// ================= Tools =================
//

fn symbol_schema(extra: Option<(&str, Value)>) -> Value {
    let mut properties = Map::new();
    properties.insert(
        "symbol".into(),
        json!({"type": "string", "description": "The stock ticker symbol, e.g. AAPL"}),
    );
    if let Some((name, schema)) = extra {
        properties.insert(name.into(), schema);
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": ["symbol"],
    })
}

pub struct StockPriceTool {
    api: Arc<YahooFinanceClient>,
}

#[async_trait::async_trait]
impl Tool for StockPriceTool {
    fn name(&self) -> &str {
        "get_current_stock_price"
    }

    fn description(&self) -> &str {
        "Get the current stock price for a given symbol"
    }

    fn parameters(&self) -> Value {
        symbol_schema(None)
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let symbol = require_str(input, "symbol")?;
        Ok(ToolOutput::ok(self.api.current_price(symbol).await?))
    }
}

pub struct AnalystRecommendationsTool {
    api: Arc<YahooFinanceClient>,
}

#[async_trait::async_trait]
impl Tool for AnalystRecommendationsTool {
    fn name(&self) -> &str {
        "get_analyst_recommendations"
    }

    fn description(&self) -> &str {
        "Get analyst recommendation counts (strong buy to strong sell) for a given symbol"
    }

    fn parameters(&self) -> Value {
        symbol_schema(None)
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let symbol = require_str(input, "symbol")?;
        Ok(ToolOutput::ok(self.api.analyst_recommendations(symbol).await?))
    }
}

pub struct StockFundamentalsTool {
    api: Arc<YahooFinanceClient>,
}

#[async_trait::async_trait]
impl Tool for StockFundamentalsTool {
    fn name(&self) -> &str {
        "get_stock_fundamentals"
    }

    fn description(&self) -> &str {
        "Get fundamental data (market cap, P/E, EPS, margins, 52-week range) for a given symbol"
    }

    fn parameters(&self) -> Value {
        symbol_schema(None)
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let symbol = require_str(input, "symbol")?;
        Ok(ToolOutput::ok(self.api.fundamentals(symbol).await?))
    }
}

pub struct CompanyNewsTool {
    api: Arc<YahooFinanceClient>,
}

#[async_trait::async_trait]
impl Tool for CompanyNewsTool {
    fn name(&self) -> &str {
        "get_company_news"
    }

    fn description(&self) -> &str {
        "Get the latest news stories about a company"
    }

    fn parameters(&self) -> Value {
        symbol_schema(Some((
            "num_stories",
            json!({"type": "integer", "description": "Number of stories to return", "default": 3}),
        )))
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let symbol = require_str(input, "symbol")?;
        let stories = optional_usize(input, "num_stories", DEFAULT_NEWS_STORIES).clamp(1, 20);
        Ok(ToolOutput::ok(self.api.company_news(symbol, stories).await?))
    }
}

/// Build the enabled stock tools over a shared client
pub fn yfinance_tools(
    api: Arc<YahooFinanceClient>,
    options: StockToolOptions,
) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> = Vec::new();

    if options.stock_price {
        tools.push(Arc::new(StockPriceTool { api: api.clone() }));
    }
    if options.analyst_recommendations {
        tools.push(Arc::new(AnalystRecommendationsTool { api: api.clone() }));
    }
    if options.stock_fundamentals {
        tools.push(Arc::new(StockFundamentalsTool { api: api.clone() }));
    }
    if options.company_news {
        tools.push(Arc::new(CompanyNewsTool { api }));
    }

    tools
}
