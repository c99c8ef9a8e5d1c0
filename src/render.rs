use rust_decimal::Decimal;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::balance::BalanceView;
use crate::controller::{Snapshot, Status};
use crate::error::FetchResult;
use crate::theme::Theme;
use crate::types::{Event, Market, Page, ResourceKind};

/// Placeholder figures shown until the backend reports performance.
pub struct PlaceholderStats {
    pub seven_day_change: &'static str,
    pub bets_value: &'static str,
    pub cash_remaining: &'static str,
    pub transactions_today: &'static str,
}

pub const PLACEHOLDER_STATS: PlaceholderStats = PlaceholderStats {
    seven_day_change: "+4.21%",
    bets_value: "$128,430",
    cash_remaining: "$41,200",
    transactions_today: "37",
};

/// Placeholder seven-day P&L series.
pub const PLACEHOLDER_PNL: [(&str, i64); 7] = [
    ("Mon", 120),
    ("Tue", 340),
    ("Wed", 290),
    ("Thu", 480),
    ("Fri", 610),
    ("Sat", 720),
    ("Sun", 860),
];

/// Placeholder capital allocation per venue.
pub const PLACEHOLDER_ALLOCATION: [(&str, i64); 2] = [("Polymarket", 68_430), ("Kalshi", 60_000)];

/// Format cents as US currency: `128430` → `$1,284.30`.
pub fn format_cents(cents: i64) -> String {
    let amount = Decimal::new(cents, 2).abs();
    let text = format!("{amount:.2}");
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let sign = if cents < 0 { "-" } else { "" };
    format!("{sign}${}.{frac}", group_thousands(whole))
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Show a backend price string as-is behind a dollar sign.
pub fn price(raw: &str) -> String {
    format!("${raw}")
}

pub fn page_label(snapshot: &Snapshot) -> String {
    format!("Page {}", snapshot.page_index + 1)
}

/// Header line: total in bets and cash available.
pub fn header(theme: Theme, view: &BalanceView) -> String {
    let title = theme.accent("Merchant");
    match (&view.balance, view.loading) {
        (Some(balance), _) => {
            let mut line = format!(
                "{title}  {} {}  |  {} {}",
                theme.muted("Total in Bets"),
                format_cents(0),
                theme.muted("Cash Available"),
                theme.accent(&format_cents(balance.total_balance)),
            );
            if let Some(err) = &view.error {
                line.push_str(&format!("  {}", theme.error(&format!("({err})"))));
            }
            line
        }
        (None, true) => format!("{title}  {}", theme.muted("Loading balance...")),
        (None, false) => match &view.error {
            Some(err) => {
                let message = format!("Balance unavailable: {err}");
                format!("{title}  {}", theme.error(&message))
            }
            None => title,
        },
    }
}

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "7D Performance")]
    performance: &'static str,
    #[tabled(rename = "Open Bets Value")]
    bets_value: &'static str,
    #[tabled(rename = "Cash Remaining")]
    cash_remaining: &'static str,
    #[tabled(rename = "Transactions Today")]
    transactions: &'static str,
}

/// Dashboard landing view: title, stat cards, P&L series and allocation.
pub fn overview(theme: Theme) -> String {
    let stats = Table::new([StatRow {
        performance: PLACEHOLDER_STATS.seven_day_change,
        bets_value: PLACEHOLDER_STATS.bets_value,
        cash_remaining: PLACEHOLDER_STATS.cash_remaining,
        transactions: PLACEHOLDER_STATS.transactions_today,
    }])
    .with(Style::rounded())
    .to_string();

    let peak = PLACEHOLDER_PNL.iter().map(|(_, v)| *v).max().unwrap_or(1).max(1);
    let pnl: Vec<String> = PLACEHOLDER_PNL
        .iter()
        .map(|(day, v)| {
            let width = (*v * 30 / peak) as usize;
            format!("  {day} {:>5} {}", v, "#".repeat(width))
        })
        .collect();

    let total: i64 = PLACEHOLDER_ALLOCATION.iter().map(|(_, v)| v).sum();
    let allocation: Vec<String> = PLACEHOLDER_ALLOCATION
        .iter()
        .map(|(venue, v)| {
            let pct = if total > 0 { *v as f64 / total as f64 * 100.0 } else { 0.0 };
            format!("  {venue:<11} {:>9}  {pct:>5.1}%", format_cents(v * 100))
        })
        .collect();

    format!(
        "{}\n{}\n\n{stats}\n\n{}\n{}\n\n{}\n{}",
        theme.accent("Arbitrage Dashboard"),
        theme.muted("Polymarket <-> Kalshi performance overview"),
        theme.accent("7 Day Performance"),
        pnl.join("\n"),
        theme.accent("Allocation"),
        allocation.join("\n"),
    )
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "#")]
    row: usize,
    #[tabled(rename = "Event Title")]
    title: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Subtitle")]
    sub_title: String,
}

#[derive(Tabled)]
struct MarketRow {
    #[tabled(rename = "Market Title")]
    title: String,
    #[tabled(rename = "Subtitle")]
    sub_title: String,
    #[tabled(rename = "Yes %")]
    yes: String,
    #[tabled(rename = "No %")]
    no: String,
    #[tabled(rename = "Close Time")]
    close_time: String,
}

fn market_rows(markets: &[Market]) -> Vec<MarketRow> {
    markets
        .iter()
        .map(|m| MarketRow {
            title: m.title.clone(),
            sub_title: m.yes_sub_title.clone(),
            yes: price(&m.yes_ask_dollars),
            no: price(&m.no_ask_dollars),
            close_time: m.close_time.clone(),
        })
        .collect()
}

fn pager(theme: Theme, snapshot: &Snapshot, shown: usize) -> String {
    let noun = match snapshot.kind {
        ResourceKind::Events => "events",
        ResourceKind::Markets => "markets",
    };
    let prev = if snapshot.has_prev { "[p] Previous" } else { "" };
    let next = if snapshot.has_next { "[n] Next" } else { "" };
    format!(
        "{}   {prev}  {}  {next}",
        theme.muted(&format!("Showing {shown} {noun} per page")),
        page_label(snapshot),
    )
}

/// Loading and error states replace the table; otherwise the last good page
/// is drawn.
fn status_line(theme: Theme, snapshot: &Snapshot) -> Option<String> {
    let noun = snapshot.kind.to_string();
    match &snapshot.status {
        Status::Idle | Status::Loading => Some(theme.muted(&format!("Loading {noun}..."))),
        Status::Failed(msg) => Some(theme.error(&format!("Error loading {noun}: {msg}"))),
        Status::Ready => None,
    }
}

pub fn events_table(theme: Theme, snapshot: &Snapshot, page: Option<&Page<Event>>) -> String {
    if let Some(line) = status_line(theme, snapshot) {
        return line;
    }
    let Some(page) = page else {
        return theme.muted("No events found");
    };
    if page.items.is_empty() {
        return format!("{}\n{}", theme.muted("No events found"), pager(theme, snapshot, 0));
    }
    let rows: Vec<EventRow> = page
        .items
        .iter()
        .enumerate()
        .map(|(i, e)| EventRow {
            row: i,
            title: e.title.clone(),
            category: e.category.clone(),
            sub_title: e.sub_title.clone(),
        })
        .collect();
    let table = Table::new(rows).with(Style::rounded()).to_string();
    format!("{table}\n{}", pager(theme, snapshot, page.items.len()))
}

pub fn markets_table(theme: Theme, snapshot: &Snapshot, page: Option<&Page<Market>>) -> String {
    if let Some(line) = status_line(theme, snapshot) {
        return line;
    }
    let Some(page) = page else {
        return theme.muted("No markets found");
    };
    if page.items.is_empty() {
        return format!("{}\n{}", theme.muted("No markets found"), pager(theme, snapshot, 0));
    }
    let table = Table::new(market_rows(&page.items))
        .with(Style::rounded())
        .to_string();
    format!("{table}\n{}", pager(theme, snapshot, page.items.len()))
}

/// Markets under an expanded event row.
pub fn event_markets(
    theme: Theme,
    event: &Event,
    markets: &FetchResult<std::sync::Arc<Page<Market>>>,
) -> String {
    let heading = theme.accent(&event.title);
    match markets {
        Err(_) => format!("{heading}\n{}", theme.error("Error loading markets")),
        Ok(page) if page.items.is_empty() => {
            format!("{heading}\n{}", theme.muted("No Valid Markets"))
        }
        Ok(page) => {
            let table = Table::new(market_rows(&page.items))
                .with(Style::rounded())
                .to_string();
            format!("{heading}\n{table}")
        }
    }
}

pub fn date_range_line(theme: Theme, snapshot: &Snapshot) -> String {
    let (from, to) = snapshot.filter.date_range();
    let fmt = |d: chrono::DateTime<chrono::Utc>| d.format("%b %d, %Y").to_string();
    let range = match (from, to) {
        (Some(f), Some(t)) => format!("{} - {}", fmt(f), fmt(t)),
        (Some(f), None) => fmt(f),
        (None, Some(t)) => format!("until {}", fmt(t)),
        (None, None) => "Pick a date range".to_string(),
    };
    format!("{} {range}", theme.muted("Market Close Date Range:"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterState;

    fn snapshot(kind: ResourceKind, status: Status) -> Snapshot {
        Snapshot {
            kind,
            page_index: 2,
            has_next: true,
            has_prev: true,
            filter: FilterState::default(),
            status,
        }
    }

    #[test]
    fn cents_formatting() {
        assert_eq!(format_cents(0), "$0.00");
        assert_eq!(format_cents(5), "$0.05");
        assert_eq!(format_cents(128_430), "$1,284.30");
        assert_eq!(format_cents(12_843_000), "$128,430.00");
        assert_eq!(format_cents(-250), "-$2.50");
    }

    #[test]
    fn price_is_not_reformatted() {
        assert_eq!(price("0.4200"), "$0.4200");
        assert_eq!(price("1"), "$1");
    }

    #[test]
    fn page_label_is_one_based() {
        assert_eq!(page_label(&snapshot(ResourceKind::Events, Status::Ready)), "Page 3");
    }

    #[test]
    fn failed_status_replaces_table() {
        let snap = snapshot(ResourceKind::Markets, Status::Failed("rate limited".into()));
        let page = Page {
            items: vec![Market::default()],
            cursor: String::new(),
        };
        let out = markets_table(Theme::TokyoDark, &snap, Some(&page));
        assert!(out.contains("Error loading markets: rate limited"));
        assert!(!out.contains("Market Title"));
    }

    #[test]
    fn events_table_lists_rows() {
        let snap = snapshot(ResourceKind::Events, Status::Ready);
        let page = Page {
            items: vec![Event {
                title: "Fed decision".into(),
                category: "Economics".into(),
                ..Default::default()
            }],
            cursor: "abc".into(),
        };
        let out = events_table(Theme::TokyoLight, &snap, Some(&page));
        assert!(out.contains("Fed decision"));
        assert!(out.contains("Economics"));
        assert!(out.contains("Page 3"));
        assert!(out.contains("Showing 1 events per page"));
    }

    #[test]
    fn empty_nested_markets() {
        let event = Event::default();
        let out = event_markets(Theme::TokyoDark, &event, &Ok(std::sync::Arc::new(Page::empty())));
        assert!(out.contains("No Valid Markets"));
    }
}
