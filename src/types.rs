use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A grouping of related markets, as served by `/api/v1/events`.
///
/// Fields the dashboard does not name are kept in `extra` and serialized back
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub event_ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sub_title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub mutually_exclusive: bool,
    #[serde(default)]
    pub series_ticker: String,
    #[serde(default)]
    pub strike_period: String,
    #[serde(default)]
    pub available_on_brokers: bool,
    #[serde(default)]
    pub collateral_return_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single binary-outcome market.
///
/// Price fields are decimal strings straight from the backend and are never
/// parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Market {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub event_ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub no_bid_dollars: String,
    #[serde(default)]
    pub yes_bid_dollars: String,
    #[serde(default)]
    pub yes_sub_title: String,
    #[serde(default)]
    pub no_sub_title: String,
    #[serde(default)]
    pub close_time: String,
    #[serde(default)]
    pub yes_ask_dollars: String,
    #[serde(default)]
    pub no_ask_dollars: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `/api/v1/events`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<Event>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cursor: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub milestones: Vec<Value>,
}

/// Body of `/api/v1/markets` and `/api/v1/markets/by-event`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub markets: Vec<Market>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cursor: String,
}

/// The backend serializes empty lists as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of `/api/v1/balance`. `total_balance` is in cents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub total_balance: i64,
    pub currency: String,
    #[serde(default)]
    pub breakdown: BalanceBreakdown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceBreakdown {
    #[serde(default)]
    pub kalshi: f64,
}

/// One page of a cursor-paginated listing. An empty cursor means there is no
/// further page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: String,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            cursor: String::new(),
        }
    }

    pub fn has_more(&self) -> bool {
        !self.cursor.is_empty()
    }
}

impl From<EventsResponse> for Page<Event> {
    fn from(resp: EventsResponse) -> Self {
        Self {
            items: resp.events,
            cursor: resp.cursor,
        }
    }
}

impl From<MarketsResponse> for Page<Market> {
    fn from(resp: MarketsResponse) -> Self {
        Self {
            items: resp.markets,
            cursor: resp.cursor,
        }
    }
}

/// Which listing a controller pages through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Events,
    Markets,
}

impl ResourceKind {
    /// Whether the backend filters this listing by close timestamp.
    pub fn supports_close_filter(self) -> bool {
        matches!(self, ResourceKind::Markets)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Events => write!(f, "events"),
            ResourceKind::Markets => write!(f, "markets"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_keeps_price_strings_and_unknown_fields() {
        let json = r#"{
            "ticker": "KXBTC-25",
            "event_ticker": "KXBTC",
            "title": "BTC above 100k?",
            "yes_ask_dollars": "0.4200",
            "no_ask_dollars": "0.5900",
            "close_time": "2026-10-20T00:00:00Z",
            "status": "active"
        }"#;
        let market: Market = serde_json::from_str(json).unwrap();
        assert_eq!(market.yes_ask_dollars, "0.4200");
        assert_eq!(market.no_ask_dollars, "0.5900");
        assert_eq!(market.extra.get("status"), Some(&Value::from("active")));

        let back = serde_json::to_value(&market).unwrap();
        assert_eq!(back["status"], "active");
        assert_eq!(back["yes_ask_dollars"], "0.4200");
    }

    #[test]
    fn events_response_to_page() {
        let json = r#"{
            "events": [{"event_ticker": "E1", "title": "One", "mutually_exclusive": true}],
            "cursor": "abc",
            "milestones": []
        }"#;
        let resp: EventsResponse = serde_json::from_str(json).unwrap();
        let page: Page<Event> = resp.into();
        assert_eq!(page.items.len(), 1);
        assert!(page.items[0].mutually_exclusive);
        assert!(page.has_more());
    }

    #[test]
    fn null_lists_decode_as_empty() {
        let json = r#"{
            "events": [{"event_ticker": "E1", "title": "One"}],
            "cursor": "abc",
            "milestones": null
        }"#;
        let resp: EventsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.events.len(), 1);
        assert!(resp.milestones.is_empty());

        let json = r#"{"events": null, "cursor": null}"#;
        let resp: EventsResponse = serde_json::from_str(json).unwrap();
        let page: Page<Event> = resp.into();
        assert!(page.items.is_empty());
        assert!(!page.has_more());

        let json = r#"{"markets": null, "cursor": ""}"#;
        let resp: MarketsResponse = serde_json::from_str(json).unwrap();
        assert!(resp.markets.is_empty());
    }

    #[test]
    fn balance_decodes() {
        let json = r#"{
            "total_balance": 128430,
            "currency": "USD",
            "breakdown": {"kalshi": 128430}
        }"#;
        let balance: Balance = serde_json::from_str(json).unwrap();
        assert_eq!(balance.total_balance, 128430);
        assert_eq!(balance.currency, "USD");
        assert_eq!(balance.breakdown.kalshi, 128430.0);
    }

    #[test]
    fn only_markets_support_close_filter() {
        assert!(ResourceKind::Markets.supports_close_filter());
        assert!(!ResourceKind::Events.supports_close_filter());
    }
}
