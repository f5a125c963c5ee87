//! SQLite-backed MetricsStore, one database per practice.

use std::sync::Arc;

use chrono::NaiveDateTime;

use super::cohort::open_practice;
use super::error::MetricsError;
use super::traits::MetricsStore;
use crate::db::{self, EvidenceWriteReport, PracticeRegistry};
use crate::models::{EvidenceMap, MetricSummary};

pub struct SqliteMetricsStore {
    registry: Arc<PracticeRegistry>,
    evidence_batch_size: usize,
}

impl SqliteMetricsStore {
    pub fn new(registry: Arc<PracticeRegistry>, evidence_batch_size: usize) -> Self {
        Self {
            registry,
            evidence_batch_size: evidence_batch_size.max(1),
        }
    }
}

impl MetricsStore for SqliteMetricsStore {
    fn ensure_schema(&self, practice_id: &str) -> Result<(), MetricsError> {
        let conn = open_practice(&self.registry, practice_id)?;
        db::ensure_schema(&conn)?;
        Ok(())
    }

    fn upsert_summary(&self, summary: &MetricSummary, now: NaiveDateTime) -> Result<i64, MetricsError> {
        let conn = open_practice(&self.registry, &summary.practice_id)?;
        let id = db::upsert_summary(&conn, summary, now)?;
        tracing::debug!(
            practice_id = %summary.practice_id,
            period = %summary.period,
            summary_id = id,
            "Summary upserted"
        );
        Ok(id)
    }

    fn replace_evidence(
        &self,
        practice_id: &str,
        summary_id: i64,
        evidence: &EvidenceMap,
    ) -> Result<EvidenceWriteReport, MetricsError> {
        let conn = open_practice(&self.registry, practice_id)?;
        let report = db::replace_evidence(&conn, summary_id, evidence, self.evidence_batch_size)?;
        if report.batches_failed > 0 {
            tracing::warn!(
                practice_id,
                summary_id,
                rows_written = report.rows_written,
                rows_failed = report.rows_failed,
                batches_failed = report.batches_failed,
                "Evidence partially written"
            );
        }
        Ok(report)
    }
}
