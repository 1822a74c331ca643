use serde::{Deserialize, Serialize};

/// A time-of-day window in Eastern wall-clock minutes, inclusive on both ends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradingWindow {
    pub start: (u32, u32),
    pub end: (u32, u32),
}

impl TradingWindow {
    pub fn describe(&self) -> String {
        format!(
            "{}:{:02}-{}:{:02} ET",
            self.start.0, self.start.1, self.end.0, self.end.1
        )
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Channels
    pub primary_webhook_url: String,
    pub extra_webhook_urls: Vec<String>,

    // Presentation
    pub symbol_label: String,
    pub buy_image_url: String,
    pub sell_image_url: String,

    // Time-of-day policy (Eastern)
    pub trading_window: TradingWindow,
    pub bias_release: (u32, u32),
    pub settlement: (u32, u32),
    pub retention_sweep: (u32, u32),

    // Duplicate suppression
    pub duplicate_window_ms: i64,

    // Retention
    pub trade_max_age_ms: i64,
    pub archive_max_age_ms: i64,
    pub pending_bias_max_age_ms: i64,

    // Dispatch
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub batch_capacity: usize,
    pub batch_delay_ms: u64,
    pub request_timeout_secs: u64,

    // Server
    pub bind_addr: String,

    // Logging
    pub log_level: String,
}

fn parse_hhmm(value: &str, default: (u32, u32)) -> (u32, u32) {
    let mut parts = value.splitn(2, ':');
    let h = parts.next().and_then(|p| p.trim().parse().ok());
    let m = parts.next().and_then(|p| p.trim().parse().ok());
    match (h, m) {
        (Some(h), Some(m)) if h < 24 && m < 60 => (h, m),
        _ => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let extra_webhook_urls = env("DISCORD_WEBHOOK_URLS_EXTRA", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Config {
            primary_webhook_url: env("DISCORD_WEBHOOK_URL", ""),
            extra_webhook_urls,
            symbol_label: env("SYMBOL_LABEL", "NQ|NAS100"),
            buy_image_url: env("BUY_IMAGE_URL", ""),
            sell_image_url: env("SELL_IMAGE_URL", ""),
            trading_window: TradingWindow {
                start: parse_hhmm(&env("TRADING_START", "9:34"), (9, 34)),
                end: parse_hhmm(&env("TRADING_END", "11:00"), (11, 0)),
            },
            bias_release: parse_hhmm(&env("BIAS_RELEASE", "8:30"), (8, 30)),
            settlement: parse_hhmm(&env("SETTLEMENT", "16:00"), (16, 0)),
            retention_sweep: parse_hhmm(&env("RETENTION_SWEEP", "3:00"), (3, 0)),
            duplicate_window_ms: env("DUPLICATE_WINDOW_MS", "5000")
                .parse()
                .unwrap_or(5000),
            trade_max_age_ms: 24 * 60 * 60 * 1000,
            archive_max_age_ms: 30 * 24 * 60 * 60 * 1000,
            pending_bias_max_age_ms: 24 * 60 * 60 * 1000,
            retry_max_attempts: env("RETRY_MAX_ATTEMPTS", "3").parse().unwrap_or(3),
            retry_base_delay_ms: env("RETRY_BASE_DELAY_MS", "1000")
                .parse()
                .unwrap_or(1000),
            batch_capacity: env("BATCH_CAPACITY", "10").parse().unwrap_or(10),
            batch_delay_ms: env("BATCH_DELAY_MS", "500").parse().unwrap_or(500),
            request_timeout_secs: env("REQUEST_TIMEOUT_SECS", "10").parse().unwrap_or(10),
            bind_addr: env("BIND_ADDR", "0.0.0.0:8080"),
            log_level: env("LOG_LEVEL", "INFO"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hhmm_with_fallback() {
        assert_eq!(parse_hhmm("9:34", (0, 0)), (9, 34));
        assert_eq!(parse_hhmm("16:00", (0, 0)), (16, 0));
        assert_eq!(parse_hhmm("garbage", (8, 30)), (8, 30));
        assert_eq!(parse_hhmm("25:00", (8, 30)), (8, 30));
        assert_eq!(parse_hhmm("9", (8, 30)), (8, 30));
    }

    #[test]
    fn window_describes_itself() {
        let w = TradingWindow {
            start: (9, 34),
            end: (11, 0),
        };
        assert_eq!(w.describe(), "9:34-11:00 ET");
    }
}
