//! Probe: dashboard backend endpoints
//!
//! Hits each REST endpoint the dashboard reads and documents:
//! - Status and latency
//! - Response shape and fields present on the first item
//! - Cursor behavior across two pages
//! - The by-event 404 convention for events without markets

use std::time::Instant;

use anyhow::Result;
use serde_json::Value;

use merchant_dashboard::config::{AppConfig, CONFIG_PATH};
use merchant_dashboard::{BALANCE_PATH, EVENTS_PATH, MARKETS_BY_EVENT_PATH, MARKETS_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config =
        AppConfig::load_or_default(std::path::Path::new(CONFIG_PATH))?.with_env_overrides();
    let base = config.validated_base_url()?;
    let client = reqwest::Client::new();

    println!("=== Probe: dashboard backend ===");
    println!("Base URL: {base}");
    println!();

    // 1. Balance
    println!("--- 1. Balance ---");
    let (status, body) = get(&client, &format!("{base}{BALANCE_PATH}"), &[]).await?;
    println!("Status: {status}");
    println!("{}", serde_json::to_string_pretty(&body)?);
    println!();

    // 2. Events, two pages
    println!("--- 2. Events (limit=5) ---");
    let events_url = format!("{base}{EVENTS_PATH}");
    let (status, first) = get(&client, &events_url, &[("limit", "5".into())]).await?;
    println!("Status: {status}");
    let cursor = describe_page(&first, "events");
    let mut first_event_ticker = None;
    if let Some(event) = first.get("events").and_then(Value::as_array).and_then(|a| a.first()) {
        first_event_ticker = event.get("event_ticker").and_then(Value::as_str).map(str::to_string);
        print_fields(
            event,
            &["event_ticker", "title", "sub_title", "category", "mutually_exclusive"],
        );
    }
    if !cursor.is_empty() {
        let (_, second) = get(
            &client,
            &events_url,
            &[("limit", "5".into()), ("cursor", cursor.clone())],
        )
        .await?;
        let next = describe_page(&second, "events");
        println!("Page 2 cursor differs from page 1: {}", next != cursor);
    }
    println!();

    // 3. Markets
    println!("--- 3. Markets (limit=5, mve_filter=exclude) ---");
    let (status, markets) = get(
        &client,
        &format!("{base}{MARKETS_PATH}"),
        &[("limit", "5".into()), ("mve_filter", "exclude".into())],
    )
    .await?;
    println!("Status: {status}");
    describe_page(&markets, "markets");
    if let Some(market) = markets.get("markets").and_then(Value::as_array).and_then(|a| a.first()) {
        print_fields(
            market,
            &["ticker", "title", "yes_ask_dollars", "no_ask_dollars", "close_time"],
        );
    }
    println!();

    // 4. Markets by event, including an unknown event
    println!("--- 4. Markets by event ---");
    let by_event_url = format!("{base}{MARKETS_BY_EVENT_PATH}");
    if let Some(ticker) = first_event_ticker {
        let (status, body) = get(
            &client,
            &by_event_url,
            &[("event_ticker", ticker.clone()), ("limit", "100".into())],
        )
        .await?;
        println!("{ticker}: status {status}");
        describe_page(&body, "markets");
    }
    let (status, body) = get(
        &client,
        &by_event_url,
        &[("event_ticker", "NO-SUCH-EVENT".into()), ("limit", "100".into())],
    )
    .await?;
    println!("Unknown event: status {status} body {body}");
    println!();

    println!("=== Probe Complete ===");
    Ok(())
}

async fn get(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<(reqwest::StatusCode, Value)> {
    let start = Instant::now();
    let resp = client.get(url).query(query).send().await?;
    let status = resp.status();
    let text = resp.text().await?;
    println!("GET {url} {query:?} -> {status} in {:?}", start.elapsed());
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    Ok((status, body))
}

/// Print item count and cursor; returns the cursor.
fn describe_page(body: &Value, items_field: &str) -> String {
    let count = body
        .get(items_field)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    let cursor = body
        .get("cursor")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    println!("{items_field}: {count}, cursor: {cursor:?}");
    cursor
}

fn print_fields(item: &Value, important: &[&str]) {
    println!("Fields present:");
    if let Some(obj) = item.as_object() {
        for key in obj.keys() {
            let marker = if important.contains(&key.as_str()) { "*" } else { " " };
            println!("  {marker} {key}");
        }
    }
}
