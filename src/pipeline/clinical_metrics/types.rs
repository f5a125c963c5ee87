use serde::{Deserialize, Serialize};

use crate::models::EnrollmentPeriod;

/// What happened to one (practice, period) pair during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodOutcome {
    /// Summary and evidence written.
    Persisted,
    /// No patients enrolled in the period.
    Skipped,
    /// Fetch or persist failed; the previous summary row is left as is.
    Failed,
}

/// Per-period line of a run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodResult {
    pub practice_id: String,
    pub period: EnrollmentPeriod,
    pub outcome: PeriodOutcome,
    pub cohort_size: usize,
    pub summary_id: Option<i64>,
    pub evidence_rows: usize,
}

/// Summary of one orchestrator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Correlates the log lines of one run.
    pub run_id: String,
    pub practices_processed: u32,
    pub practices_failed: u32,
    pub periods_persisted: u32,
    pub periods_skipped: u32,
    pub periods_failed: u32,
    pub evidence_rows_written: usize,
    pub evidence_rows_failed: usize,
    pub duration_ms: u64,
    pub periods: Vec<PeriodResult>,
}

impl RunReport {
    pub fn record(&mut self, result: PeriodResult) {
        match result.outcome {
            PeriodOutcome::Persisted => self.periods_persisted += 1,
            PeriodOutcome::Skipped => self.periods_skipped += 1,
            PeriodOutcome::Failed => self.periods_failed += 1,
        }
        self.periods.push(result);
    }

    pub fn has_failures(&self) -> bool {
        self.practices_failed > 0 || self.periods_failed > 0 || self.evidence_rows_failed > 0
    }

    pub fn outcome(&self, practice_id: &str, period: EnrollmentPeriod) -> Option<PeriodOutcome> {
        self.periods
            .iter()
            .find(|p| p.practice_id == practice_id && p.period == period)
            .map(|p| p.outcome)
    }
}
