//! Clinical metrics ETL for remote-patient-monitoring telemetry.
//!
//! Per practice and enrollment period, aggregates BP, SpO2, weight and
//! glucose readings plus alert flags into one summary row, and records the
//! readings behind every bucket as evidence rows for drill-down.
//!
//! Layout:
//! - `parser` / `thresholds`: payload decoding and clinical cut-offs
//! - `classify`: pure per-device classifiers
//! - `traits`: CohortProvider, TelemetrySource, MetricsStore seams
//! - `cohort` / `reader` / `store`: SQLite implementations of those seams
//! - `runner`: the orchestrator; `background`: the interval scheduler

pub mod background;
pub mod classify;
pub mod cohort;
pub mod error;
pub mod parser;
pub mod reader;
pub mod runner;
pub mod store;
pub mod thresholds;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use background::{start_scheduler, MetricsSchedulerHandle};
pub use cohort::SqliteCohortProvider;
pub use error::MetricsError;
pub use reader::SqliteTelemetrySource;
pub use runner::MetricsRunner;
pub use store::SqliteMetricsStore;
pub use traits::{CohortProvider, MetricsStore, TelemetrySource};
pub use types::{PeriodOutcome, PeriodResult, RunReport};
