//! Seams of the metrics pipeline.
//!
//! - CohortProvider: who is enrolled in a period
//! - TelemetrySource: what those patients' devices sent
//! - MetricsStore: where summaries and evidence land
//!
//! The runner only sees these traits, so tests swap in in-memory fakes.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use super::error::MetricsError;
use crate::db::{AlertCounts, EvidenceWriteReport};
use crate::models::{Cohort, DateWindow, DeviceReading, DeviceType, EnrollmentPeriod, EvidenceMap, MetricSummary};

pub trait CohortProvider: Send + Sync {
    /// Patients of `practice_id` enrolled in `period`. An empty cohort is
    /// not an error.
    fn get_cohort(&self, practice_id: &str, period: EnrollmentPeriod) -> Result<Cohort, MetricsError>;
}

/// Read-only access to device telemetry, scoped to a cohort.
pub trait TelemetrySource: Send + Sync {
    /// Readings of one device type inside `window`, newest first within
    /// each query chunk.
    fn fetch_readings(
        &self,
        cohort: &Cohort,
        device: DeviceType,
        window: &DateWindow,
    ) -> Result<Vec<DeviceReading>, MetricsError>;

    /// Earliest-ever weight per patient, ignoring any window. Patients
    /// without a positive weight are absent.
    fn fetch_weight_baselines(&self, cohort: &Cohort) -> Result<BTreeMap<String, f64>, MetricsError>;

    /// Reading and alert-flag counts inside `window`.
    fn count_alerts(&self, cohort: &Cohort, window: &DateWindow) -> Result<AlertCounts, MetricsError>;

    /// Readings inside `window` with at least one alert flag.
    fn fetch_flagged_readings(
        &self,
        cohort: &Cohort,
        window: &DateWindow,
    ) -> Result<Vec<DeviceReading>, MetricsError>;
}

pub trait MetricsStore: Send + Sync {
    /// Create the metric tables of a practice if absent.
    fn ensure_schema(&self, practice_id: &str) -> Result<(), MetricsError>;

    /// Insert or update the summary row of (practice, period); returns its id.
    fn upsert_summary(&self, summary: &MetricSummary, now: NaiveDateTime) -> Result<i64, MetricsError>;

    /// Swap the evidence of a summary for `evidence`.
    fn replace_evidence(
        &self,
        practice_id: &str,
        summary_id: i64,
        evidence: &EvidenceMap,
    ) -> Result<EvidenceWriteReport, MetricsError>;
}
