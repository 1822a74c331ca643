use crate::core::hours;
use crate::models::{
    ArchiveRecord, BiasKind, Direction, ExitKind, LiveTrade, PendingBias, PerformanceSummary,
    Signal, SummaryKind,
};
use crate::notify::Message;

/// Renders alerts for humans. Templates are presentation only; every state
/// decision has already been made by the time a message is built.
pub struct Formatter {
    symbol_label: String,
    buy_image_url: String,
    sell_image_url: String,
}

impl Formatter {
    pub fn new(
        symbol_label: impl Into<String>,
        buy_image_url: impl Into<String>,
        sell_image_url: impl Into<String>,
    ) -> Self {
        Self {
            symbol_label: symbol_label.into(),
            buy_image_url: buy_image_url.into(),
            sell_image_url: sell_image_url.into(),
        }
    }

    pub fn entry(&self, signal: &Signal, direction: Direction) -> Message {
        let (verb, image) = match direction {
            Direction::Long => ("Buy", &self.buy_image_url),
            Direction::Short => ("Sell", &self.sell_image_url),
        };
        let content = [
            format!("**{} {} Now**", verb, self.symbol_label),
            format!("Trade ID: {}", signal.trade_id),
            signal.symbol_line(),
            format!("Time: {}", signal.display_time),
            format!("Entry: {}", signal.entry),
            format!("SL: {}", signal.sl),
            format!("TP1: {}", signal.tp1),
            format!("TP2: {}", signal.tp2),
        ]
        .join("\n");
        Message::with_image(content, image.clone())
    }

    pub fn partial(&self, signal: &Signal, exit: ExitKind) -> Message {
        let note = match exit {
            ExitKind::Be => "SL moved to entry. Partials secured.",
            _ => "TP1 hit. SL moved to entry. Partials secured.",
        };
        Message::text(
            [
                format!("**Trade Update: {} HIT**", exit),
                format!("Trade ID: {}", signal.trade_id),
                signal.symbol_line(),
                format!("Time: {}", signal.display_time),
                format!("Price: {}", signal.price),
                note.to_string(),
            ]
            .join("\n"),
        )
    }

    pub fn closed(&self, signal: &Signal, archive: &ArchiveRecord) -> Message {
        let note = match archive.exit_kind {
            ExitKind::Tp2 => "TP2 hit. Trade fully closed.",
            _ => "Stop hit. Trade closed.",
        };
        Message::text(
            [
                format!("**Trade Update: {} HIT**", archive.exit_kind),
                format!("Trade ID: {}", signal.trade_id),
                signal.symbol_line(),
                format!("Time: {}", signal.display_time),
                format!("Price: {}", signal.price),
                format!(
                    "Result: {} ({:+.2} pts)",
                    if archive.win { "WIN" } else { "LOSS" },
                    archive.points
                ),
                note.to_string(),
            ]
            .join("\n"),
        )
    }

    pub fn bias(&self, kind: BiasKind, profile: &str, display_time: &str) -> Message {
        let header = match kind {
            BiasKind::Opening => "**Opening Bias**",
            BiasKind::Flip => "**Bias Flip**",
        };
        Message::text(
            [
                header.to_string(),
                self.symbol_label.clone(),
                format!("Time: {}", display_time),
                format!("Outlook: {}", profile),
            ]
            .join("\n"),
        )
    }

    pub fn bias_release(&self, pending: &PendingBias) -> Message {
        self.bias(
            BiasKind::Opening,
            &pending.profile,
            &hours::format_display(&pending.time),
        )
    }

    pub fn summary(&self, summary: &PerformanceSummary, kind: SummaryKind) -> Message {
        let header = match kind {
            SummaryKind::Daily => "**Daily Summary**",
            SummaryKind::Weekly => "**Weekly Summary**",
        };
        let range = match summary.dates.as_slice() {
            [single] => single.clone(),
            [first, .., last] => format!("{first} to {last}"),
            [] => String::new(),
        };
        Message::text(
            [
                header.to_string(),
                format!("{} | {}", self.symbol_label, range),
                format!(
                    "Trades: {} | Wins: {} | Losses: {} | Win rate: {:.0}%",
                    summary.total,
                    summary.wins,
                    summary.losses,
                    summary.win_rate()
                ),
                format!("Net points: {:+.2}", summary.points),
            ]
            .join("\n"),
        )
    }

    /// One self-contained settlement line per live trade; the dispatcher
    /// groups them into capacity-sized batches.
    pub fn force_close_line(&self, trade: &LiveTrade) -> String {
        format!(
            "Hard Stop - Market Close | {} {} {} @ {}",
            trade.id,
            trade.direction,
            if trade.tf.is_empty() {
                trade.symbol.clone()
            } else {
                format!("{} {}m", trade.symbol, trade.tf)
            },
            trade.entry
        )
    }

    pub fn unknown(&self, signal: &Signal) -> Message {
        Message::text(
            [
                "**Unknown alert type**".to_string(),
                format!("Type: {}", signal.raw_type),
                format!("Trade ID: {}", signal.trade_id),
                format!("Symbol: {}", signal.symbol_line()),
                format!("Time: {}", signal.display_time),
                "Check the indicator alert configuration.".to_string(),
            ]
            .join("\n"),
        )
    }
}
