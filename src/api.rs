use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};
use crate::types::{Balance, Event, EventsResponse, Market, MarketsResponse, Page, ResourceKind};
use crate::{BALANCE_PATH, EVENTS_PATH, MARKETS_BY_EVENT_PATH, MARKETS_PATH};

/// Markets requested per event when expanding an event row.
pub const MARKETS_PER_EVENT: u32 = 100;

/// Identifies one page of a listing. Equal keys are the same logical query.
///
/// Event keys never carry close bounds: the backend does not filter events by
/// close time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub kind: ResourceKind,
    pub limit: u32,
    pub cursor: String,
    pub min_close_ts: Option<i64>,
    pub max_close_ts: Option<i64>,
}

impl FetchKey {
    pub fn new(
        kind: ResourceKind,
        limit: u32,
        cursor: &str,
        min_close_ts: Option<i64>,
        max_close_ts: Option<i64>,
    ) -> Self {
        let (min_close_ts, max_close_ts) = if kind.supports_close_filter() {
            (min_close_ts, max_close_ts)
        } else {
            (None, None)
        };
        Self {
            kind,
            limit,
            cursor: cursor.to_string(),
            min_close_ts,
            max_close_ts,
        }
    }
}

/// Markets nested under one event, narrowed by close time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventMarketsKey {
    pub event_ticker: String,
    pub min_close_ts: Option<i64>,
    pub max_close_ts: Option<i64>,
}

/// Source of paginated listings.
pub trait PageSource<T>: Send + Sync {
    fn fetch_page(&self, key: &FetchKey) -> BoxFuture<'static, FetchResult<Page<T>>>;
}

/// Source of the markets nested under an event.
pub trait EventMarketsSource: Send + Sync {
    fn markets_by_event(
        &self,
        key: &EventMarketsKey,
    ) -> BoxFuture<'static, FetchResult<Page<Market>>>;
}

/// Source of the account balance.
pub trait BalanceSource: Send + Sync {
    fn balance(&self) -> BoxFuture<'static, FetchResult<Balance>>;
}

/// HTTP client for the dashboard backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// `timeout = None` leaves requests bounded only by the transport.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` with `query` and decode the JSON body.
    ///
    /// Non-success statuses become `FetchError::Http`, using the body's
    /// `error` field as the message when present, otherwise `fallback`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        fallback: &str,
    ) -> FetchResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {url} {query:?}");
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        decode_response(status, &body, fallback)
    }

    pub async fn fetch_balance(&self) -> FetchResult<Balance> {
        self.get_json(BALANCE_PATH, &[], "Failed to fetch balance").await
    }

    pub async fn fetch_events(&self, limit: u32, cursor: &str) -> FetchResult<EventsResponse> {
        let query = events_query(limit, cursor);
        self.get_json(EVENTS_PATH, &query, "Failed to fetch events").await
    }

    pub async fn fetch_markets(
        &self,
        limit: u32,
        cursor: &str,
        min_close_ts: Option<i64>,
        max_close_ts: Option<i64>,
    ) -> FetchResult<MarketsResponse> {
        let query = markets_query(limit, cursor, min_close_ts, max_close_ts);
        self.get_json(MARKETS_PATH, &query, "Failed to fetch markets").await
    }

    /// Markets for one event. A 404 means the event has no valid markets and
    /// yields an empty response.
    pub async fn fetch_markets_by_event(
        &self,
        key: &EventMarketsKey,
    ) -> FetchResult<MarketsResponse> {
        if key.event_ticker.is_empty() {
            return Ok(MarketsResponse::default());
        }
        let query = by_event_query(key);
        let result = self
            .get_json(MARKETS_BY_EVENT_PATH, &query, "Failed to fetch markets for event")
            .await;
        not_found_as_empty(result)
    }
}

impl PageSource<Event> for ApiClient {
    fn fetch_page(&self, key: &FetchKey) -> BoxFuture<'static, FetchResult<Page<Event>>> {
        let api = self.clone();
        let key = key.clone();
        async move {
            api.fetch_events(key.limit, &key.cursor)
                .await
                .map(Page::<Event>::from)
        }
        .boxed()
    }
}

impl PageSource<Market> for ApiClient {
    fn fetch_page(&self, key: &FetchKey) -> BoxFuture<'static, FetchResult<Page<Market>>> {
        let api = self.clone();
        let key = key.clone();
        async move {
            api.fetch_markets(key.limit, &key.cursor, key.min_close_ts, key.max_close_ts)
                .await
                .map(Page::<Market>::from)
        }
        .boxed()
    }
}

impl EventMarketsSource for ApiClient {
    fn markets_by_event(
        &self,
        key: &EventMarketsKey,
    ) -> BoxFuture<'static, FetchResult<Page<Market>>> {
        let api = self.clone();
        let key = key.clone();
        async move { api.fetch_markets_by_event(&key).await.map(Page::<Market>::from) }.boxed()
    }
}

impl BalanceSource for ApiClient {
    fn balance(&self) -> BoxFuture<'static, FetchResult<Balance>> {
        let api = self.clone();
        async move { api.fetch_balance().await }.boxed()
    }
}

fn events_query(limit: u32, cursor: &str) -> Vec<(&'static str, String)> {
    let mut query = vec![("limit", limit.to_string())];
    if !cursor.is_empty() {
        query.push(("cursor", cursor.to_string()));
    }
    query
}

fn markets_query(
    limit: u32,
    cursor: &str,
    min_close_ts: Option<i64>,
    max_close_ts: Option<i64>,
) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("limit", limit.to_string()),
        ("mve_filter", "exclude".to_string()),
    ];
    if !cursor.is_empty() {
        query.push(("cursor", cursor.to_string()));
    }
    push_close_bounds(&mut query, min_close_ts, max_close_ts);
    query
}

fn by_event_query(key: &EventMarketsKey) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("event_ticker", key.event_ticker.clone()),
        ("limit", MARKETS_PER_EVENT.to_string()),
    ];
    push_close_bounds(&mut query, key.min_close_ts, key.max_close_ts);
    query
}

fn push_close_bounds(
    query: &mut Vec<(&'static str, String)>,
    min_close_ts: Option<i64>,
    max_close_ts: Option<i64>,
) {
    if let Some(ts) = min_close_ts {
        query.push(("min_close_ts", ts.to_string()));
    }
    if let Some(ts) = max_close_ts {
        query.push(("max_close_ts", ts.to_string()));
    }
}

/// Turn a status and raw body into a decoded value or a typed failure.
pub fn decode_response<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
    fallback: &str,
) -> FetchResult<T> {
    if !status.is_success() {
        let message = error_message(body, fallback);
        warn!("Backend returned {status}: {message}");
        return Err(FetchError::Http {
            status: status.as_u16(),
            message,
        });
    }
    Ok(serde_json::from_str(body)?)
}

/// Best-effort message from a `{"error": "..."}` body.
pub fn error_message(body: &str, fallback: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .filter(|msg| !msg.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Reinterpret a 404 as an empty listing.
pub fn not_found_as_empty(result: FetchResult<MarketsResponse>) -> FetchResult<MarketsResponse> {
    match result {
        Err(FetchError::Http { status: 404, .. }) => {
            debug!("No markets for event (404)");
            Ok(MarketsResponse::default())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_from_body() {
        assert_eq!(error_message(r#"{"error":"rate limited"}"#, "fallback"), "rate limited");
    }

    #[test]
    fn error_message_fallbacks() {
        assert_eq!(error_message("", "Failed to fetch events"), "Failed to fetch events");
        assert_eq!(error_message("<html>", "fb"), "fb");
        assert_eq!(error_message(r#"{"error":""}"#, "fb"), "fb");
        assert_eq!(error_message(r#"{"error":42}"#, "fb"), "fb");
        assert_eq!(error_message(r#"{"message":"x"}"#, "fb"), "fb");
    }

    #[test]
    fn decode_success() {
        let resp: MarketsResponse = decode_response(
            StatusCode::OK,
            r#"{"markets":[{"ticker":"M1","yes_ask_dollars":"0.42"}],"cursor":"abc"}"#,
            "fb",
        )
        .unwrap();
        assert_eq!(resp.markets.len(), 1);
        assert_eq!(resp.cursor, "abc");
    }

    #[test]
    fn decode_http_500_uses_body_message() {
        let err = decode_response::<MarketsResponse>(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"rate limited"}"#,
            "Failed to fetch markets",
        )
        .unwrap_err();
        assert_eq!(
            err,
            FetchError::Http {
                status: 500,
                message: "rate limited".to_string()
            }
        );
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn decode_malformed_json() {
        let err =
            decode_response::<MarketsResponse>(StatusCode::OK, "{not json", "fb").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn by_event_404_is_empty() {
        let result = decode_response::<MarketsResponse>(StatusCode::NOT_FOUND, "", "fb");
        let resp = not_found_as_empty(result).unwrap();
        assert!(resp.markets.is_empty());
        assert_eq!(resp.cursor, "");
    }

    #[test]
    fn by_event_other_errors_propagate() {
        let result = decode_response::<MarketsResponse>(StatusCode::BAD_GATEWAY, "", "fb");
        assert_eq!(not_found_as_empty(result).unwrap_err().status(), Some(502));
    }

    #[test]
    fn events_query_omits_empty_cursor() {
        assert_eq!(events_query(10, ""), vec![("limit", "10".to_string())]);
        assert_eq!(
            events_query(5, "abc"),
            vec![("limit", "5".to_string()), ("cursor", "abc".to_string())]
        );
    }

    #[test]
    fn markets_query_params() {
        let q = markets_query(25, "c1", Some(100), None);
        assert_eq!(
            q,
            vec![
                ("limit", "25".to_string()),
                ("mve_filter", "exclude".to_string()),
                ("cursor", "c1".to_string()),
                ("min_close_ts", "100".to_string()),
            ]
        );
    }

    #[test]
    fn by_event_query_params() {
        let key = EventMarketsKey {
            event_ticker: "KXFED".to_string(),
            min_close_ts: None,
            max_close_ts: Some(200),
        };
        assert_eq!(
            by_event_query(&key),
            vec![
                ("event_ticker", "KXFED".to_string()),
                ("limit", "100".to_string()),
                ("max_close_ts", "200".to_string()),
            ]
        );
    }

    #[test]
    fn event_keys_drop_close_bounds() {
        let events = FetchKey::new(ResourceKind::Events, 10, "", Some(1), Some(2));
        assert_eq!(events.min_close_ts, None);
        assert_eq!(events.max_close_ts, None);

        let markets = FetchKey::new(ResourceKind::Markets, 10, "", Some(1), Some(2));
        assert_eq!(markets.min_close_ts, Some(1));
        assert_eq!(markets.max_close_ts, Some(2));
    }

    #[tokio::test]
    async fn empty_event_ticker_skips_request() {
        // Unroutable base: a request would fail with a network error.
        let api = ApiClient::new("http://127.0.0.1:9", None).unwrap();
        let key = EventMarketsKey {
            event_ticker: String::new(),
            min_close_ts: None,
            max_close_ts: None,
        };
        let resp = api.fetch_markets_by_event(&key).await.unwrap();
        assert!(resp.markets.is_empty());
    }
}
