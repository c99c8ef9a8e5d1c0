use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::{info, warn};

use merchant_dashboard::api::{ApiClient, EventMarketsSource, PageSource};
use merchant_dashboard::balance::{self, BalanceMonitor, BalanceView};
use merchant_dashboard::browser::{EventBrowser, NestedMarkets};
use merchant_dashboard::config::{AppConfig, CONFIG_PATH};
use merchant_dashboard::controller::{Completion, ListController, Navigation, Status};
use merchant_dashboard::error::FetchResult;
use merchant_dashboard::filter::{FilterState, PAGE_SIZE_OPTIONS};
use merchant_dashboard::render;
use merchant_dashboard::reporter;
use merchant_dashboard::theme::{Theme, ThemeStore};
use merchant_dashboard::types::{Balance, Event, Market, ResourceKind};

#[derive(Parser)]
#[command(name = "dashboard", about = "Polymarket <-> Kalshi arbitrage dashboard")]
struct Args {
    /// Path to the config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Backend base URL (overrides config and DASHBOARD_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Emit JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Balance header, performance stats and allocation
    Overview,
    /// Account balance
    Balance {
        /// Keep running and refresh on the configured interval
        #[arg(long)]
        watch: bool,
    },
    /// Browse events and the markets under them
    Events(BrowseArgs),
    /// Browse markets by close date
    Markets(BrowseArgs),
    /// Show or change the color theme
    Theme {
        #[command(subcommand)]
        action: Option<ThemeAction>,
    },
}

#[derive(clap::Args)]
struct BrowseArgs {
    /// Page size
    #[arg(long)]
    limit: Option<u32>,

    /// Earliest market close date (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    from: Option<String>,

    /// Latest market close date (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    to: Option<String>,

    /// Print the first page and exit
    #[arg(long)]
    once: bool,
}

#[derive(Subcommand)]
enum ThemeAction {
    Get,
    Set { theme: Theme },
    Toggle,
}

/// A line typed into an interactive browser.
#[derive(Debug, PartialEq)]
enum BrowserCommand {
    Next,
    Prev,
    Limit(u32),
    Range(Option<DateTime<Utc>>, Option<DateTime<Utc>>),
    Open(usize),
    Refresh,
    ToggleTheme,
    Help,
    Quit,
}

const HELP: &str = "commands: n next | p prev | l <5|10|25> page size | \
d <from|-> <to|-> close range | o <row> open event | r refresh | t theme | q quit";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = AppConfig::load_or_default(&args.config)?
        .with_env_overrides()
        .with_base_url(args.api_url.clone());
    let base_url = config.validated_base_url()?;
    info!("Using backend at {base_url}");

    let api = ApiClient::new(&base_url, config.request_timeout())?;
    let mut themes = ThemeStore::init(&config.settings.state_path)?;

    match args.command {
        Command::Overview => overview(&api, &config, themes.get(), args.json).await,
        Command::Balance { watch } => {
            show_balance(&api, &config, themes.get(), watch, args.json).await
        }
        Command::Events(browse) => {
            browse_events(&api, &config, &mut themes, browse, args.json).await
        }
        Command::Markets(browse) => {
            browse_markets(&api, &config, &mut themes, browse, args.json).await
        }
        Command::Theme { action } => {
            match action.unwrap_or(ThemeAction::Get) {
                ThemeAction::Get => {}
                ThemeAction::Set { theme } => themes.set(theme)?,
                ThemeAction::Toggle => {
                    themes.toggle()?;
                }
            }
            println!("{}", themes.get());
            Ok(())
        }
    }
}

async fn overview(api: &ApiClient, config: &AppConfig, theme: Theme, json: bool) -> Result<()> {
    let cache = balance::balance_cache(config.balance_stale());
    let fetch = balance::current_balance(Arc::new(api.clone()), &cache);
    let Some(result) = until_ctrl_c(fetch).await else {
        return Ok(());
    };
    if json {
        if let Ok(balance) = &result {
            reporter::report_value(balance);
        }
        return result.map(|_| ()).map_err(Into::into);
    }
    println!("{}\n", render::header(theme, &view_of(result)));
    println!("{}", render::overview(theme));
    Ok(())
}

async fn show_balance(
    api: &ApiClient,
    config: &AppConfig,
    theme: Theme,
    watch: bool,
    json: bool,
) -> Result<()> {
    let cache = balance::balance_cache(config.balance_stale());
    if !watch {
        let fetch = balance::current_balance(Arc::new(api.clone()), &cache);
        let Some(result) = until_ctrl_c(fetch).await else {
            return Ok(());
        };
        match &result {
            Ok(balance) if json => reporter::report_value(balance),
            _ => println!("{}", render::header(theme, &view_of(result.clone()))),
        }
        return result.map(|_| ()).map_err(Into::into);
    }

    let monitor = BalanceMonitor::spawn(Arc::new(api.clone()), cache, config.balance_refresh());
    let mut updates = monitor.subscribe();
    info!(
        "Watching balance (refresh every {}s). Press Ctrl+C to stop.",
        config.settings.balance_refresh_secs
    );
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    warn!("Balance monitor stopped");
                    break;
                }
                let view = updates.borrow_and_update().clone();
                if view.loading {
                    continue;
                }
                match (&view.balance, json) {
                    (Some(balance), true) => reporter::report_value(balance),
                    _ => println!("{}", render::header(theme, &view)),
                }
            }
        }
    }
    Ok(())
}

/// Run `fut` unless Ctrl+C arrives first.
async fn until_ctrl_c<F: Future>(fut: F) -> Option<F::Output> {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            None
        }
        out = fut => Some(out),
    }
}

fn view_of(result: FetchResult<Balance>) -> BalanceView {
    match result {
        Ok(balance) => BalanceView {
            balance: Some(balance),
            ..Default::default()
        },
        Err(e) => BalanceView {
            error: Some(e.to_string()),
            ..Default::default()
        },
    }
}

fn initial_filter(
    config: &AppConfig,
    kind: ResourceKind,
    browse: &BrowseArgs,
) -> Result<FilterState> {
    let now = Utc::now();
    let filter = match kind {
        ResourceKind::Events => FilterState::events_default(now),
        ResourceKind::Markets => FilterState::markets_default(now),
    };
    let mut filter = filter.with_limit(browse.limit.unwrap_or(config.settings.default_limit))?;
    if browse.from.is_some() || browse.to.is_some() {
        let (default_from, default_to) = filter.date_range();
        let from = browse.from.as_deref().map(parse_date).transpose()?.or(default_from);
        let to = browse.to.as_deref().map(parse_date).transpose()?.or(default_to);
        filter.set_date_range(from, to);
    }
    Ok(filter)
}

/// Next thing for a browser loop to act on.
enum Input<T> {
    Shutdown,
    Loaded(Completion<T>),
    Expanded(Event, NestedMarkets),
    Line(String),
}

/// Wait for Ctrl+C, a finished fetch or a line of input, whichever comes
/// first. Fetches keep running while the loop waits on stdin and vice versa.
async fn next_input<T>(
    loaded: &mut mpsc::UnboundedReceiver<Completion<T>>,
    expanded: &mut mpsc::UnboundedReceiver<(Event, NestedMarkets)>,
    lines: &mut Lines<BufReader<Stdin>>,
    interactive: bool,
) -> Result<Input<T>> {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(Input::Shutdown)
        }
        Some(completion) = loaded.recv() => Ok(Input::Loaded(completion)),
        Some((event, markets)) = expanded.recv() => Ok(Input::Expanded(event, markets)),
        line = lines.next_line(), if interactive => {
            match line.context("failed to read stdin")? {
                Some(line) => Ok(Input::Line(line)),
                None => Ok(Input::Shutdown),
            }
        }
    }
}

async fn browse_events(
    api: &ApiClient,
    config: &AppConfig,
    themes: &mut ThemeStore,
    browse: BrowseArgs,
    json: bool,
) -> Result<()> {
    let filter = initial_filter(config, ResourceKind::Events, &browse)?;
    let source = Arc::new(api.clone());
    let mut browser = EventBrowser::new(
        filter,
        Arc::clone(&source) as Arc<dyn PageSource<Event>>,
        source as Arc<dyn EventMarketsSource>,
    );
    let (loaded_tx, mut loaded) = mpsc::unbounded_channel();
    let (expanded_tx, mut expanded) = mpsc::unbounded_channel();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    browser.list.spawn(Navigation::Reload, &loaded_tx);
    draw_events(&browser, themes.get(), json);
    if !browse.once {
        eprintln!("{HELP}");
    }
    loop {
        let input = next_input(&mut loaded, &mut expanded, &mut lines, !browse.once).await?;
        let line = match input {
            Input::Shutdown => break,
            Input::Loaded((request, result)) => {
                if browser.list.complete(&request, result) {
                    draw_events(&browser, themes.get(), json);
                    if browse.once {
                        break;
                    }
                }
                continue;
            }
            Input::Expanded(event, markets) => {
                if json {
                    if let Ok(page) = &markets {
                        reporter::report_value(&**page);
                    }
                } else {
                    println!("{}", render::event_markets(themes.get(), &event, &markets));
                }
                continue;
            }
            Input::Line(line) => line,
        };
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match command {
            BrowserCommand::Quit => break,
            BrowserCommand::Help => {
                eprintln!("{HELP}");
                continue;
            }
            BrowserCommand::Next => {
                browser.list.spawn(Navigation::Next, &loaded_tx);
            }
            BrowserCommand::Prev => {
                browser.list.spawn(Navigation::Prev, &loaded_tx);
            }
            BrowserCommand::Limit(limit) => {
                if let Err(e) = browser.list.apply_limit(limit) {
                    eprintln!("{e}");
                    continue;
                }
                browser.list.spawn(Navigation::Reload, &loaded_tx);
            }
            BrowserCommand::Range(from, to) => browser.set_date_range(from, to),
            BrowserCommand::Refresh => {
                browser.refresh_nested();
                browser.list.spawn(Navigation::Refresh, &loaded_tx);
            }
            BrowserCommand::ToggleTheme => {
                themes.toggle()?;
            }
            BrowserCommand::Open(row) => {
                let Some(event) = browser.event_at(row).cloned() else {
                    eprintln!("no event at row {row}");
                    continue;
                };
                let fetch = browser.markets_for(&event.event_ticker);
                let done = expanded_tx.clone();
                tokio::spawn(async move {
                    let _ = done.send((event, fetch.await));
                });
                continue;
            }
        }
        draw_events(&browser, themes.get(), json);
    }
    Ok(())
}

fn draw_events(browser: &EventBrowser, theme: Theme, json: bool) {
    let snapshot = browser.list.snapshot();
    let page = browser.list.current().map(|p| &**p);
    if json {
        if let (Status::Ready, Some(page)) = (&snapshot.status, page) {
            reporter::report_page(&snapshot, page);
        }
        return;
    }
    println!("{}", render::date_range_line(theme, &snapshot));
    println!("{}", render::events_table(theme, &snapshot, page));
}

async fn browse_markets(
    api: &ApiClient,
    config: &AppConfig,
    themes: &mut ThemeStore,
    browse: BrowseArgs,
    json: bool,
) -> Result<()> {
    let filter = initial_filter(config, ResourceKind::Markets, &browse)?;
    let source: Arc<dyn PageSource<Market>> = Arc::new(api.clone());
    let mut list = ListController::new(ResourceKind::Markets, filter, source);
    let (loaded_tx, mut loaded) = mpsc::unbounded_channel();
    // Markets have no nested view; the sender stays alive so `recv` never
    // reports a closed channel.
    let (_expanded_tx, mut expanded) = mpsc::unbounded_channel();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    list.spawn(Navigation::Reload, &loaded_tx);
    draw_markets(&list, themes.get(), json);
    if !browse.once {
        eprintln!("{HELP}");
    }
    loop {
        let input = next_input(&mut loaded, &mut expanded, &mut lines, !browse.once).await?;
        let line = match input {
            Input::Shutdown => break,
            Input::Loaded((request, result)) => {
                if list.complete(&request, result) {
                    draw_markets(&list, themes.get(), json);
                    if browse.once {
                        break;
                    }
                }
                continue;
            }
            Input::Expanded(..) => continue,
            Input::Line(line) => line,
        };
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match command {
            BrowserCommand::Quit => break,
            BrowserCommand::Help | BrowserCommand::Open(_) => {
                eprintln!("{HELP}");
                continue;
            }
            BrowserCommand::Next => {
                list.spawn(Navigation::Next, &loaded_tx);
            }
            BrowserCommand::Prev => {
                list.spawn(Navigation::Prev, &loaded_tx);
            }
            BrowserCommand::Limit(limit) => {
                if let Err(e) = list.apply_limit(limit) {
                    eprintln!("{e}");
                    continue;
                }
                list.spawn(Navigation::Reload, &loaded_tx);
            }
            BrowserCommand::Range(from, to) => {
                if list.apply_date_range(from, to) {
                    list.spawn(Navigation::Reload, &loaded_tx);
                }
            }
            BrowserCommand::Refresh => {
                list.spawn(Navigation::Refresh, &loaded_tx);
            }
            BrowserCommand::ToggleTheme => {
                themes.toggle()?;
            }
        }
        draw_markets(&list, themes.get(), json);
    }
    Ok(())
}

fn draw_markets(list: &ListController<Market>, theme: Theme, json: bool) {
    let snapshot = list.snapshot();
    let page = list.current().map(|p| &**p);
    if json {
        if let (Status::Ready, Some(page)) = (&snapshot.status, page) {
            reporter::report_page(&snapshot, page);
        }
        return;
    }
    println!("{}", render::date_range_line(theme, &snapshot));
    println!("{}", render::markets_table(theme, &snapshot, page));
}

fn parse_command(line: &str) -> Result<Option<BrowserCommand>> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(None);
    };
    let command = match head {
        "n" | "next" => BrowserCommand::Next,
        "p" | "prev" => BrowserCommand::Prev,
        "r" | "refresh" => BrowserCommand::Refresh,
        "t" | "theme" => BrowserCommand::ToggleTheme,
        "q" | "quit" => BrowserCommand::Quit,
        "h" | "help" | "?" => BrowserCommand::Help,
        "l" | "limit" => {
            let raw = parts.next().context("usage: l <page size>")?;
            let limit: u32 = raw.parse().with_context(|| format!("invalid page size '{raw}'"))?;
            if !PAGE_SIZE_OPTIONS.contains(&limit) {
                anyhow::bail!("page size must be one of {PAGE_SIZE_OPTIONS:?}");
            }
            BrowserCommand::Limit(limit)
        }
        "o" | "open" => {
            let raw = parts.next().context("usage: o <row>")?;
            BrowserCommand::Open(raw.parse().with_context(|| format!("invalid row '{raw}'"))?)
        }
        "d" | "dates" => {
            let from = parts.next().context("usage: d <from|-> <to|->")?;
            let to = parts.next().unwrap_or("-");
            BrowserCommand::Range(parse_optional_date(from)?, parse_optional_date(to)?)
        }
        other => anyhow::bail!("unknown command '{other}' (h for help)"),
    };
    Ok(Some(command))
}

fn parse_optional_date(raw: &str) -> Result<Option<DateTime<Utc>>> {
    if raw == "-" {
        return Ok(None);
    }
    parse_date(raw).map(Some)
}

/// `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{raw}' (expected YYYY-MM-DD)"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .context("invalid time of day")?;
    Ok(midnight.and_utc())
}
