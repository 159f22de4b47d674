//! Usage and cost dashboard backed by the runtime's metering engine.

use std::fmt;

use thiserror::Error;

use crate::backend::{SharedBackend, UsageStats};
use crate::error_taxonomy;

pub const NO_USAGE_MESSAGE: &str = "No usage data for this period";

/// Lookback windows the metering engine aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LookbackWindow(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unsupported usage window of {0} days. Expected 1, 7, 30, or 90.")]
pub struct UnsupportedWindow(pub u32);

impl LookbackWindow {
    pub const ALL: [LookbackWindow; 4] = [
        LookbackWindow(1),
        LookbackWindow(7),
        LookbackWindow(30),
        LookbackWindow(90),
    ];

    pub fn from_days(days: u32) -> Result<Self, UnsupportedWindow> {
        Self::ALL
            .into_iter()
            .find(|window| window.0 == days)
            .ok_or(UnsupportedWindow(days))
    }

    #[must_use]
    pub fn days(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn label(self) -> String {
        match self.0 {
            1 => "Last 24 hours".to_string(),
            days => format!("Last {days} days"),
        }
    }
}

impl Default for LookbackWindow {
    fn default() -> Self {
        Self(7)
    }
}

impl fmt::Display for LookbackWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// `1234.56789` -> `$1,234.5679`
#[must_use]
pub fn format_cost(usd: f64) -> String {
    let fixed = format!("{:.4}", usd.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "0000"));
    let sign = if usd < 0.0 && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        "-"
    } else {
        ""
    };
    format!("{sign}${}.{fraction}", group_thousands(whole))
}

/// `1234567` -> `1,234,567`
#[must_use]
pub fn format_count(value: i64) -> String {
    let grouped = group_thousands(&value.unsigned_abs().to_string());
    if value < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Per-provider usage table plus aggregate cost for one lookback window.
pub struct UsageDashboard {
    backend: SharedBackend,
    window: LookbackWindow,
    stats: Vec<UsageStats>,
    total_cost: f64,
    error: Option<String>,
    loaded: bool,
}

impl UsageDashboard {
    #[must_use]
    pub fn new(backend: SharedBackend, window: LookbackWindow) -> Self {
        Self {
            backend,
            window,
            stats: Vec::new(),
            total_cost: 0.0,
            error: None,
            loaded: false,
        }
    }

    #[must_use]
    pub fn window(&self) -> LookbackWindow {
        self.window
    }

    pub fn set_window(&mut self, window: LookbackWindow) {
        self.window = window;
    }

    #[must_use]
    pub fn stats(&self) -> &[UsageStats] {
        &self.stats
    }

    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Banner from the last failed load, cleared by the next success.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Fetch stats, then total cost, for the current window. Both must
    /// succeed before the table is replaced.
    pub async fn load(&mut self) {
        let days = self.window.days();
        let result = match self.backend.usage_stats(days).await {
            Ok(stats) => self
                .backend
                .total_cost(days)
                .await
                .map(|cost| (stats, cost))
                .map_err(|err| error_taxonomy::report("total_cost", &err)),
            Err(err) => Err(error_taxonomy::report("usage_stats", &err)),
        };

        match result {
            Ok((stats, cost)) => {
                self.stats = stats;
                self.total_cost = cost;
                self.error = None;
                self.loaded = true;
            }
            Err(message) => {
                self.error = Some(format!("Failed to load usage stats: {message}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::test_support::{Call, FakeBackend};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn stat(provider: &str, requests: i64, cost: f64) -> UsageStats {
        UsageStats {
            provider: provider.to_string(),
            total_requests: requests,
            total_tokens: requests * 1_000,
            total_cost_usd: cost,
            period_start: "2026-10-12T00:00:00Z".to_string(),
            period_end: "2026-10-19T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn cost_uses_four_fraction_digits_and_grouping() {
        assert_eq!(format_cost(0.0), "$0.0000");
        assert_eq!(format_cost(0.00123), "$0.0012");
        assert_eq!(format_cost(1234.5678), "$1,234.5678");
        assert_eq!(format_cost(1_000_000.0), "$1,000,000.0000");
        assert_eq!(format_cost(-2.5), "-$2.5000");
    }

    #[test]
    fn counts_are_grouped() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_234), "1,234");
        assert_eq!(format_count(12_345_678), "12,345,678");
        assert_eq!(format_count(-4_500), "-4,500");
    }

    #[test]
    fn only_metered_windows_are_accepted() {
        assert_eq!(LookbackWindow::default().days(), 7);
        assert_eq!(LookbackWindow::from_days(90).map(LookbackWindow::days), Ok(90));
        assert_eq!(LookbackWindow::from_days(14), Err(UnsupportedWindow(14)));
        assert_eq!(LookbackWindow::from_days(1).unwrap().label(), "Last 24 hours");
    }

    #[tokio::test]
    async fn load_fetches_stats_then_cost_for_window() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_usage(vec![stat("gemini", 12, 0.42)], 0.42);
        let mut dashboard =
            UsageDashboard::new(backend.clone(), LookbackWindow::from_days(30).unwrap());

        dashboard.load().await;

        assert_eq!(
            backend.calls(),
            vec![Call::UsageStats(30), Call::TotalCost(30)]
        );
        assert_eq!(dashboard.stats().len(), 1);
        assert!((dashboard.total_cost() - 0.42).abs() < f64::EPSILON);
        assert_eq!(dashboard.error(), None);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_table() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_usage(vec![stat("gemini", 3, 0.01), stat("openai", 5, 0.2)], 0.21);
        let mut dashboard = UsageDashboard::new(backend.clone(), LookbackWindow::default());
        dashboard.load().await;

        backend.fail_usage(Some(BackendError::Unreachable("connection refused".into())));
        dashboard.set_window(LookbackWindow::from_days(90).unwrap());
        dashboard.load().await;

        assert_eq!(dashboard.stats().len(), 2);
        assert_eq!(
            dashboard.error(),
            Some("Failed to load usage stats: runtime unreachable: connection refused")
        );

        backend.fail_usage(None);
        dashboard.load().await;
        assert_eq!(dashboard.error(), None);
    }
}
