//! Core domain logic for watch-session analytics.
//!
//! This crate contains the fundamental types and logic for:
//! - Dedup/consolidation: deciding whether a playback report is a duplicate,
//!   a continuation of an existing session, or a new session
//! - Concurrency: sweeping session intervals into peak and hourly
//!   concurrent-stream statistics per playback decision

mod cancel;
pub mod concurrency;
pub mod dedup;
pub mod session;
pub mod types;

pub use cancel::CancellationToken;
pub use concurrency::{
    ConcurrencyPeaks, ConcurrencyPoint, ConcurrencyReport, DecisionCounts, StreamInterval,
    TimeFilter, TimeRange, compute_concurrency,
};
pub use dedup::{
    Accumulated, CanonicalSpan, ConfigError, ConsolidationConfig, Disposition, FoldPlan,
    accumulate, classify, plan_history_consolidation,
};
pub use session::{Enrichment, SessionKey, SessionReport, WatchSession, is_storable};
pub use types::{Decision, ValidationError};
