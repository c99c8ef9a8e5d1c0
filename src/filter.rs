use anyhow::{Result, ensure};
use chrono::{DateTime, Duration, Utc};

/// Page sizes offered by the browsers. The controller accepts any positive limit.
pub const PAGE_SIZE_OPTIONS: [u32; 3] = [5, 10, 25];

/// Page size used when a view is first opened.
pub const DEFAULT_LIMIT: u32 = 10;

/// Page size and close-time bounds for a listing.
///
/// `min_close_ts <= max_close_ts` is not checked; an inverted range is passed
/// to the backend as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterState {
    pub limit: u32,
    /// Epoch seconds.
    pub min_close_ts: Option<i64>,
    /// Epoch seconds.
    pub max_close_ts: Option<i64>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            min_close_ts: None,
            max_close_ts: None,
        }
    }
}

impl FilterState {
    /// Default range: markets closing between 12 hours and 7 days from `now`.
    pub fn markets_default(now: DateTime<Utc>) -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            min_close_ts: Some((now + Duration::hours(12)).timestamp()),
            max_close_ts: Some((now + Duration::days(7)).timestamp()),
        }
    }

    /// The events view opens with the same range; it only narrows the markets
    /// nested under each event.
    pub fn events_default(now: DateTime<Utc>) -> Self {
        Self::markets_default(now)
    }

    pub fn with_limit(mut self, limit: u32) -> Result<Self> {
        self.set_limit(limit)?;
        Ok(self)
    }

    pub fn set_limit(&mut self, limit: u32) -> Result<()> {
        ensure!(limit > 0, "page size must be positive, got {limit}");
        self.limit = limit;
        Ok(())
    }

    pub fn set_date_range(&mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) {
        self.min_close_ts = from.map(|d| d.timestamp());
        self.max_close_ts = to.map(|d| d.timestamp());
    }

    /// The range as datetimes, for display.
    pub fn date_range(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let to_dt = |ts: Option<i64>| ts.and_then(|s| DateTime::from_timestamp(s, 0));
        (to_dt(self.min_close_ts), to_dt(self.max_close_ts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    #[test]
    fn markets_default_range() {
        let f = FilterState::markets_default(now());
        let base = now().timestamp();
        assert_eq!(f.limit, 10);
        assert_eq!(f.min_close_ts, Some(base + 12 * 3600));
        assert_eq!(f.max_close_ts, Some(base + 7 * 86400));
    }

    #[test]
    fn events_open_with_market_range() {
        assert_eq!(FilterState::events_default(now()), FilterState::markets_default(now()));
    }

    #[test]
    fn zero_limit_rejected() {
        let mut f = FilterState::default();
        assert!(f.set_limit(0).is_err());
        assert_eq!(f.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn any_positive_limit_accepted() {
        let f = FilterState::default().with_limit(7).unwrap();
        assert_eq!(f.limit, 7);
    }

    #[test]
    fn date_range_round_trip() {
        let mut f = FilterState::default();
        let to = now() + Duration::days(3);
        f.set_date_range(Some(now()), Some(to));
        assert_eq!(f.date_range(), (Some(now()), Some(to)));

        f.set_date_range(None, None);
        assert_eq!(f.min_close_ts, None);
        assert_eq!(f.max_close_ts, None);
    }

    #[test]
    fn inverted_range_is_kept() {
        let mut f = FilterState::default();
        f.set_date_range(Some(now() + Duration::days(2)), Some(now()));
        assert!(f.min_close_ts > f.max_close_ts);
    }
}
