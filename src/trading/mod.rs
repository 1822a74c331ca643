pub mod engine;
pub mod sweep;

pub use engine::{ExitEffect, TradeEngine};
pub use sweep::{RetentionAges, SweepKind, SweepReport, Sweeps};
