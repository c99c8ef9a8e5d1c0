pub mod api;
pub mod balance;
pub mod browser;
pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod query;
pub mod render;
pub mod reporter;
pub mod theme;
pub mod types;

/// Backend base URL used when neither `config.toml` nor the environment set one.
pub const DEFAULT_API_BASE: &str = "http://localhost:8080";

/// Environment variable overriding the backend base URL.
pub const API_URL_ENV: &str = "DASHBOARD_API_URL";

/// REST paths served by the backend-for-frontend.
pub const BALANCE_PATH: &str = "/api/v1/balance";
pub const EVENTS_PATH: &str = "/api/v1/events";
pub const MARKETS_PATH: &str = "/api/v1/markets";
pub const MARKETS_BY_EVENT_PATH: &str = "/api/v1/markets/by-event";
