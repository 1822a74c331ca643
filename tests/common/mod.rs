use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex};

use tv_signal_relay::models::RawSignal;
use tv_signal_relay::notify::{Channel, ChannelError, Message};

/// A signal timestamp inside the default 9:34-11:00 ET entry window
/// (2024-01-15 is a Monday; 14:45 UTC = 9:45 AM EST).
pub fn in_window_time() -> String {
    "2024-01-15T14:45:00Z".to_string()
}

/// Build a `DateTime<Utc>` for a given Eastern wall-clock time on
/// 2024-01-15. January, so EST (UTC-5) applies.
pub fn now_at_eastern(et_hour: u32, et_minute: u32) -> DateTime<Utc> {
    let utc_hour = et_hour + 5;
    let (day_offset, hour) = if utc_hour >= 24 {
        (1, utc_hour - 24)
    } else {
        (0, utc_hour)
    };
    Utc.from_utc_datetime(
        &NaiveDate::from_ymd_opt(2024, 1, 15 + day_offset)
            .unwrap()
            .and_hms_opt(hour, et_minute, 0)
            .unwrap(),
    )
}

/// Raw entry payload with stop and targets derived from the entry price.
pub fn entry_raw(alert_type: &str, trade_id: &str, entry: &str) -> RawSignal {
    let e: f64 = entry.parse().unwrap_or(0.0);
    RawSignal {
        alert_type: Some(json!(alert_type)),
        trade_id: Some(json!(trade_id)),
        symbol: Some(json!("NQ")),
        tf: Some(json!("5")),
        time: Some(json!(in_window_time())),
        entry: Some(json!(entry)),
        sl: Some(json!((e - 50.0).to_string())),
        tp1: Some(json!((e + 25.0).to_string())),
        tp2: Some(json!((e + 50.0).to_string())),
        ..Default::default()
    }
}

/// Raw exit payload (TP1/BE/TP2/SL) carrying the exit price.
pub fn exit_raw(alert_type: &str, trade_id: &str, price: &str) -> RawSignal {
    RawSignal {
        alert_type: Some(json!(alert_type)),
        trade_id: Some(json!(trade_id)),
        symbol: Some(json!("NQ")),
        tf: Some(json!("5")),
        time: Some(json!(in_window_time())),
        price: Some(json!(price)),
        ..Default::default()
    }
}

/// A channel that accepts everything and remembers what it was sent.
pub struct RecordingChannel {
    name: String,
    sent: Mutex<Vec<Message>>,
}

impl RecordingChannel {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn contents(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    pub fn images(&self) -> Vec<Option<String>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.image_url.clone())
            .collect()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, message: &Message) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}
