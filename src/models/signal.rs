use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::core::hours;
use crate::models::Direction;

/// Exit classification. TP1/BE keep the trade live (partial), TP2/SL close it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExitKind {
    Tp1,
    Be,
    Tp2,
    Sl,
}

impl ExitKind {
    pub fn is_full_close(&self) -> bool {
        matches!(self, ExitKind::Tp2 | ExitKind::Sl)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExitKind::Tp1 => "TP1",
            ExitKind::Be => "BE",
            ExitKind::Tp2 => "TP2",
            ExitKind::Sl => "SL",
        }
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasKind {
    /// Pre-open directional outlook, subject to the morning release queue.
    Opening,
    /// Mid-session reversal, always relayed immediately.
    Flip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    Daily,
    Weekly,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalKind {
    Entry(Direction),
    Exit(Direction, ExitKind),
    Bias(BiasKind),
    Summary(SummaryKind),
    Unknown(String),
}

impl SignalKind {
    pub fn parse(alert_type: &str) -> SignalKind {
        match alert_type {
            "LONG_ENTRY" => SignalKind::Entry(Direction::Long),
            "SHORT_ENTRY" => SignalKind::Entry(Direction::Short),
            "LONG_TP1" => SignalKind::Exit(Direction::Long, ExitKind::Tp1),
            "SHORT_TP1" => SignalKind::Exit(Direction::Short, ExitKind::Tp1),
            "LONG_BE" => SignalKind::Exit(Direction::Long, ExitKind::Be),
            "SHORT_BE" => SignalKind::Exit(Direction::Short, ExitKind::Be),
            "LONG_TP2" => SignalKind::Exit(Direction::Long, ExitKind::Tp2),
            "SHORT_TP2" => SignalKind::Exit(Direction::Short, ExitKind::Tp2),
            "LONG_SL" => SignalKind::Exit(Direction::Long, ExitKind::Sl),
            "SHORT_SL" => SignalKind::Exit(Direction::Short, ExitKind::Sl),
            "AM_BIAS" => SignalKind::Bias(BiasKind::Opening),
            "BIAS_FLIP" => SignalKind::Bias(BiasKind::Flip),
            "DAILY_SUMMARY" => SignalKind::Summary(SummaryKind::Daily),
            "WEEKLY_SUMMARY" => SignalKind::Summary(SummaryKind::Weekly),
            other => SignalKind::Unknown(other.to_string()),
        }
    }
}

/// Wire payload as delivered by the charting platform. Field types are loose
/// on purpose: Pine alerts interpolate numbers and strings interchangeably.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSignal {
    #[serde(rename = "type")]
    pub alert_type: Option<Value>,
    pub symbol: Option<Value>,
    pub tf: Option<Value>,
    pub time: Option<Value>,
    pub entry: Option<Value>,
    pub sl: Option<Value>,
    pub tp1: Option<Value>,
    pub tp2: Option<Value>,
    pub price: Option<Value>,
    #[serde(rename = "tradeId")]
    pub trade_id: Option<Value>,
    pub profile: Option<Value>,
}

/// A parsed, scrubbed inbound alert. Ephemeral; never stored.
#[derive(Debug, Clone)]
pub struct Signal {
    pub kind: SignalKind,
    pub raw_type: String,
    pub trade_id: String,
    pub symbol: String,
    pub tf: String,
    /// Raw timestamp string from the payload (RFC 3339 when well-formed).
    pub time: String,
    /// Eastern-rendered display form of `time`, also part of the fingerprint.
    pub display_time: String,
    pub entry: String,
    pub sl: String,
    pub tp1: String,
    pub tp2: String,
    pub price: String,
    pub profile: String,
}

/// Normalize one loose payload field to a clean string. Literal "null" and
/// "undefined" strings come through from misconfigured alerts.
fn scrub(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty()
                || trimmed.eq_ignore_ascii_case("null")
                || trimmed.eq_ignore_ascii_case("undefined")
            {
                String::new()
            } else {
                trimmed.to_string()
            }
        }
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

fn with_na(value: Option<&Value>) -> String {
    let cleaned = scrub(value);
    if cleaned.is_empty() {
        "N/A".to_string()
    } else {
        cleaned
    }
}

/// Parse a scrubbed price field into a finite number.
pub fn parse_price(field: &str) -> Option<f64> {
    if field.is_empty() || field == "N/A" {
        return None;
    }
    field.parse::<f64>().ok().filter(|p| p.is_finite())
}

impl Signal {
    pub fn from_raw(raw: &RawSignal, now_ms: i64) -> Signal {
        let raw_type = {
            let t = scrub(raw.alert_type.as_ref()).to_uppercase();
            if t.is_empty() {
                "UNKNOWN".to_string()
            } else {
                t
            }
        };
        let trade_id = {
            let id = scrub(raw.trade_id.as_ref());
            if id.is_empty() {
                format!("TRADE_{}", now_ms)
            } else {
                id
            }
        };
        let symbol = {
            let s = scrub(raw.symbol.as_ref());
            if s.is_empty() {
                "UNKNOWN".to_string()
            } else {
                s
            }
        };
        let time = scrub(raw.time.as_ref());

        Signal {
            kind: SignalKind::parse(&raw_type),
            display_time: hours::format_display(&time),
            raw_type,
            trade_id,
            symbol,
            tf: scrub(raw.tf.as_ref()),
            time,
            entry: with_na(raw.entry.as_ref()),
            sl: with_na(raw.sl.as_ref()),
            tp1: with_na(raw.tp1.as_ref()),
            tp2: with_na(raw.tp2.as_ref()),
            price: with_na(raw.price.as_ref()),
            profile: scrub(raw.profile.as_ref()),
        }
    }

    /// "NQ 5m" when a timeframe is present, bare symbol otherwise.
    pub fn symbol_line(&self) -> String {
        if self.tf.is_empty() {
            self.symbol.clone()
        } else {
            format!("{} {}m", self.symbol, self.tf)
        }
    }

    /// Trade ids from the indicator are positive bar indices; anything else
    /// is a misconfigured alert, except our own generated fallback ids.
    pub fn trade_id_valid(&self) -> bool {
        if self.trade_id.starts_with("TRADE_") {
            return true;
        }
        self.trade_id.parse::<i64>().map(|n| n > 0).unwrap_or(false)
    }

    /// Duplicate-detection key: category, trade id, primary price field and
    /// the formatted time. Entries key on the entry price, exits on the
    /// exit price; a collision on all four is treated as one logical signal.
    pub fn fingerprint(&self) -> String {
        let primary = match self.kind {
            SignalKind::Entry(_) => &self.entry,
            SignalKind::Exit(..) => &self.price,
            _ => &self.price,
        };
        format!(
            "{}_{}_{}_{}",
            self.raw_type, self.trade_id, primary, self.display_time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(alert_type: &str) -> RawSignal {
        RawSignal {
            alert_type: Some(json!(alert_type)),
            ..Default::default()
        }
    }

    #[test]
    fn parses_entry_and_exit_types() {
        assert_eq!(
            SignalKind::parse("LONG_ENTRY"),
            SignalKind::Entry(Direction::Long)
        );
        assert_eq!(
            SignalKind::parse("SHORT_SL"),
            SignalKind::Exit(Direction::Short, ExitKind::Sl)
        );
        assert_eq!(
            SignalKind::parse("LONG_BE"),
            SignalKind::Exit(Direction::Long, ExitKind::Be)
        );
        assert_eq!(SignalKind::parse("AM_BIAS"), SignalKind::Bias(BiasKind::Opening));
        assert_eq!(
            SignalKind::parse("SOMETHING_ELSE"),
            SignalKind::Unknown("SOMETHING_ELSE".to_string())
        );
    }

    #[test]
    fn scrubs_null_like_fields() {
        let mut r = raw("LONG_ENTRY");
        r.entry = Some(json!("null"));
        r.sl = Some(json!("  "));
        r.tp1 = Some(json!(18345.25));
        let s = Signal::from_raw(&r, 1_700_000_000_000);
        assert_eq!(s.entry, "N/A");
        assert_eq!(s.sl, "N/A");
        assert_eq!(s.tp1, "18345.25");
    }

    #[test]
    fn generates_fallback_trade_id() {
        let s = Signal::from_raw(&raw("LONG_ENTRY"), 1_700_000_000_000);
        assert_eq!(s.trade_id, "TRADE_1700000000000");
        assert!(s.trade_id_valid());
    }

    #[test]
    fn rejects_non_numeric_trade_id() {
        let mut r = raw("LONG_TP2");
        r.trade_id = Some(json!("abc"));
        let s = Signal::from_raw(&r, 0);
        assert!(!s.trade_id_valid());

        r.trade_id = Some(json!("-4"));
        let s = Signal::from_raw(&r, 0);
        assert!(!s.trade_id_valid());

        r.trade_id = Some(json!("1234"));
        let s = Signal::from_raw(&r, 0);
        assert!(s.trade_id_valid());
    }

    #[test]
    fn fingerprint_uses_entry_for_entries_and_price_for_exits() {
        let mut r = raw("LONG_ENTRY");
        r.trade_id = Some(json!("7"));
        r.entry = Some(json!("100.5"));
        r.price = Some(json!("999"));
        let s = Signal::from_raw(&r, 0);
        assert!(s.fingerprint().contains("_100.5_"));

        let mut r = raw("LONG_TP2");
        r.trade_id = Some(json!("7"));
        r.entry = Some(json!("100.5"));
        r.price = Some(json!("110.25"));
        let s = Signal::from_raw(&r, 0);
        assert!(s.fingerprint().contains("_110.25_"));
    }

    #[test]
    fn parse_price_requires_finite_numbers() {
        assert_eq!(parse_price("101.25"), Some(101.25));
        assert_eq!(parse_price("N/A"), None);
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("NaN"), None);
        assert_eq!(parse_price("inf"), None);
    }
}
