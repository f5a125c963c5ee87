//! MetricsRunner: orchestrates one ETL run.
//!
//! For every registered practice and every enrollment period:
//! Cohort → Telemetry (4 devices + alerts) → Classifiers → Store.
//! Strictly sequential; one scoped connection per database operation.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;
use uuid::Uuid;

use super::classify::{classify_alerts, classify_bp, classify_glucose, classify_spo2, classify_weight};
use super::cohort::SqliteCohortProvider;
use super::error::MetricsError;
use super::reader::SqliteTelemetrySource;
use super::store::SqliteMetricsStore;
use super::traits::*;
use super::types::*;
use crate::config::EtlConfig;
use crate::db::{EvidenceWriteReport, PracticeRegistry};
use crate::models::{Cohort, DateWindow, DeviceType, EnrollmentPeriod, EvidenceMap, MetricSummary};
use crate::run_lock::RunLock;

pub struct MetricsRunner {
    registry: Arc<PracticeRegistry>,
    cohorts: Box<dyn CohortProvider>,
    telemetry: Box<dyn TelemetrySource>,
    store: Box<dyn MetricsStore>,
    lock: Arc<RunLock>,
}

impl MetricsRunner {
    pub fn new(
        registry: Arc<PracticeRegistry>,
        cohorts: Box<dyn CohortProvider>,
        telemetry: Box<dyn TelemetrySource>,
        store: Box<dyn MetricsStore>,
        lock: Arc<RunLock>,
    ) -> Self {
        Self {
            registry,
            cohorts,
            telemetry,
            store,
            lock,
        }
    }

    /// Runner over the SQLite implementations of every seam.
    pub fn sqlite(config: &EtlConfig, registry: Arc<PracticeRegistry>, lock: Arc<RunLock>) -> Self {
        Self::new(
            registry.clone(),
            Box::new(SqliteCohortProvider::new(registry.clone())),
            Box::new(SqliteTelemetrySource::new(registry.clone(), config.chunk_size)),
            Box::new(SqliteMetricsStore::new(registry.clone(), config.evidence_batch_size)),
            lock,
        )
    }

    pub fn lock(&self) -> &Arc<RunLock> {
        &self.lock
    }

    /// Run the full ETL as of `now`.
    ///
    /// Fails only when the run cannot start (another run holds the lock)
    /// or a practice's schema cannot be ensured. Everything below that is
    /// logged, tallied in the report, and skipped.
    pub fn run(&self, trigger: &str, now: NaiveDateTime) -> Result<RunReport, MetricsError> {
        let Some(_guard) = self.lock.try_acquire(trigger) else {
            let holder = self.lock.current_run();
            tracing::info!(
                trigger,
                held_by = holder.as_ref().map(|r| r.trigger.as_str()),
                since = ?holder.as_ref().map(|r| r.started_at),
                "Metrics run already in progress, skipping"
            );
            return Err(MetricsError::RunInProgress);
        };

        let start = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        tracing::info!(
            run_id = %run_id,
            trigger,
            practices = self.registry.len(),
            now = %now,
            "Clinical metrics run started"
        );

        for practice in self.registry.practices() {
            if let Err(e) = self.store.ensure_schema(&practice.practice_id) {
                tracing::error!(
                    practice_id = %practice.practice_id,
                    error = %e,
                    "Schema setup failed, aborting run"
                );
                return Err(e);
            }
        }

        let mut report = RunReport {
            run_id,
            ..RunReport::default()
        };
        for practice in self.registry.practices() {
            match self.run_practice(&practice.practice_id, now, &mut report) {
                Ok(()) => report.practices_processed += 1,
                Err(e) => {
                    tracing::error!(
                        practice_id = %practice.practice_id,
                        error = %e,
                        "Practice aborted"
                    );
                    report.practices_failed += 1;
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            run_id = %report.run_id,
            practices_processed = report.practices_processed,
            practices_failed = report.practices_failed,
            periods_persisted = report.periods_persisted,
            periods_skipped = report.periods_skipped,
            periods_failed = report.periods_failed,
            evidence_rows = report.evidence_rows_written,
            duration_ms = report.duration_ms,
            "Clinical metrics run finished"
        );
        Ok(report)
    }

    /// Every period of one practice. A cohort failure aborts the rest of
    /// the practice; fetch or persist failures only lose their own period.
    fn run_practice(
        &self,
        practice_id: &str,
        now: NaiveDateTime,
        report: &mut RunReport,
    ) -> Result<(), MetricsError> {
        for period in EnrollmentPeriod::ALL {
            let cohort = self.cohorts.get_cohort(practice_id, period)?;
            let mut result = PeriodResult {
                practice_id: practice_id.to_string(),
                period,
                outcome: PeriodOutcome::Skipped,
                cohort_size: cohort.len(),
                summary_id: None,
                evidence_rows: 0,
            };

            if cohort.is_empty() {
                tracing::info!(practice_id, period = %period, "No patients enrolled, skipping period");
                report.record(result);
                continue;
            }

            let (summary, evidence) = match self.compute_period(&cohort, now) {
                Ok(computed) => computed,
                Err(e) => {
                    tracing::warn!(
                        practice_id,
                        period = %period,
                        error = %e,
                        "Telemetry fetch failed, skipping period"
                    );
                    result.outcome = PeriodOutcome::Failed;
                    report.record(result);
                    continue;
                }
            };

            match self.persist(&summary, &evidence, now) {
                Ok((summary_id, written)) => {
                    result.outcome = PeriodOutcome::Persisted;
                    result.summary_id = Some(summary_id);
                    result.evidence_rows = written.rows_written;
                    report.evidence_rows_written += written.rows_written;
                    report.evidence_rows_failed += written.rows_failed;
                }
                Err(e) => {
                    tracing::error!(
                        practice_id,
                        period = %period,
                        error = %e,
                        "Persisting period failed"
                    );
                    result.outcome = PeriodOutcome::Failed;
                }
            }
            report.record(result);
        }
        Ok(())
    }

    /// Fetch and classify one cohort. Nothing is written here.
    pub fn compute_period(
        &self,
        cohort: &Cohort,
        now: NaiveDateTime,
    ) -> Result<(MetricSummary, EvidenceMap), MetricsError> {
        let window = DateWindow::for_period(cohort.period, now);
        let fetch = |device| self.telemetry.fetch_readings(cohort, device, &window);

        let bp = classify_bp(&fetch(DeviceType::BloodPressure)?);
        let spo2 = classify_spo2(&fetch(DeviceType::PulseOximeter)?);
        let baselines = self.telemetry.fetch_weight_baselines(cohort)?;
        let weight = classify_weight(&fetch(DeviceType::Weight)?, &baselines);
        let glucose = classify_glucose(&fetch(DeviceType::Glucose)?);

        let counts = self.telemetry.count_alerts(cohort, &window)?;
        let flagged = self.telemetry.fetch_flagged_readings(cohort, &window)?;
        let alerts = classify_alerts(counts, &flagged);

        let mut evidence = bp.evidence;
        evidence.merge(spo2.evidence);
        evidence.merge(weight.evidence);
        evidence.merge(glucose.evidence);
        evidence.merge(alerts.evidence);

        let summary = MetricSummary {
            practice_id: cohort.practice_id.clone(),
            period: cohort.period,
            summary_date: now.date(),
            total_patients: u32::try_from(cohort.len()).unwrap_or(u32::MAX),
            bp: bp.aggregate,
            spo2: spo2.aggregate,
            weight: weight.aggregate,
            glucose: glucose.aggregate,
            alerts: alerts.aggregate,
        };

        tracing::debug!(
            practice_id = %cohort.practice_id,
            period = %cohort.period,
            bp_readings = summary.bp.total_readings,
            spo2_readings = summary.spo2.total_readings,
            weight_readings = summary.weight.total_readings,
            alert_readings = summary.alerts.total_readings,
            evidence_rows = evidence.total_rows(),
            "Period classified"
        );
        Ok((summary, evidence))
    }

    fn persist(
        &self,
        summary: &MetricSummary,
        evidence: &EvidenceMap,
        now: NaiveDateTime,
    ) -> Result<(i64, EvidenceWriteReport), MetricsError> {
        let summary_id = self.store.upsert_summary(summary, now)?;
        let written = self
            .store
            .replace_evidence(&summary.practice_id, summary_id, evidence)?;
        tracing::info!(
            practice_id = %summary.practice_id,
            period = %summary.period,
            summary_id,
            patients = summary.total_patients,
            evidence_rows = written.rows_written,
            "Period persisted"
        );
        Ok((summary_id, written))
    }
}
