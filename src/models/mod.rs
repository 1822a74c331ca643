pub mod direction;
pub mod outcome;
pub mod signal;
pub mod trade;

pub use direction::Direction;
pub use outcome::{Action, Rejection, Verdict};
pub use signal::{BiasKind, ExitKind, RawSignal, Signal, SignalKind, SummaryKind};
pub use trade::{ArchiveRecord, LiveTrade, PendingBias, PerformanceSummary, Trade};
