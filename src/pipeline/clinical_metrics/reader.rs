//! Chunked telemetry reader.
//!
//! Cohorts can run to thousands of patients, so every query is issued per
//! chunk of ids. Each chunk opens its own connection and drops it before
//! the next one starts.

use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::Connection;

use super::cohort::open_practice;
use super::error::MetricsError;
use super::parser::parse_weight;
use super::traits::TelemetrySource;
use crate::db::{
    count_alert_flags, fetch_device_readings, fetch_earliest_payloads, fetch_flagged_readings,
    AlertCounts, DatabaseError, PracticeRegistry,
};
use crate::models::{Cohort, DateWindow, DeviceReading, DeviceType};

pub struct SqliteTelemetrySource {
    registry: Arc<PracticeRegistry>,
    chunk_size: usize,
}

impl SqliteTelemetrySource {
    pub fn new(registry: Arc<PracticeRegistry>, chunk_size: usize) -> Self {
        Self {
            registry,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Run `query` once per chunk of the cohort, each on a fresh connection.
    fn per_chunk<T>(
        &self,
        cohort: &Cohort,
        mut query: impl FnMut(&Connection, &[String]) -> Result<T, DatabaseError>,
    ) -> Result<Vec<T>, MetricsError> {
        let chunks: Vec<&[String]> = cohort.chunks(self.chunk_size).collect();
        let mut results = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().copied().enumerate() {
            let conn = open_practice(&self.registry, &cohort.practice_id)?;
            let result = query(&conn, chunk).map_err(|e| {
                tracing::warn!(
                    practice_id = %cohort.practice_id,
                    period = %cohort.period,
                    chunk = index + 1,
                    chunks = chunks.len(),
                    error = %e,
                    "Telemetry chunk query failed"
                );
                e
            })?;
            results.push(result);
        }
        Ok(results)
    }
}

impl TelemetrySource for SqliteTelemetrySource {
    fn fetch_readings(
        &self,
        cohort: &Cohort,
        device: DeviceType,
        window: &DateWindow,
    ) -> Result<Vec<DeviceReading>, MetricsError> {
        let readings: Vec<DeviceReading> = self
            .per_chunk(cohort, |conn, ids| fetch_device_readings(conn, ids, device, window))?
            .into_iter()
            .flatten()
            .collect();

        tracing::debug!(
            practice_id = %cohort.practice_id,
            period = %cohort.period,
            device = %device,
            readings = readings.len(),
            "Fetched device readings"
        );
        Ok(readings)
    }

    fn fetch_weight_baselines(&self, cohort: &Cohort) -> Result<BTreeMap<String, f64>, MetricsError> {
        let mut baselines = BTreeMap::new();
        let chunks = self.per_chunk(cohort, |conn, ids| {
            fetch_earliest_payloads(conn, ids, DeviceType::Weight)
        })?;

        for (patient_id, payload) in chunks.into_iter().flatten() {
            let weight = parse_weight(&payload).weight.or_zero();
            if weight > 0.0 {
                // Same-timestamp ties: first row wins
                baselines.entry(patient_id).or_insert(weight);
            }
        }
        Ok(baselines)
    }

    fn count_alerts(&self, cohort: &Cohort, window: &DateWindow) -> Result<AlertCounts, MetricsError> {
        let mut counts = AlertCounts::default();
        for chunk in self.per_chunk(cohort, |conn, ids| count_alert_flags(conn, ids, window))? {
            counts.accumulate(chunk);
        }

        tracing::debug!(
            practice_id = %cohort.practice_id,
            period = %cohort.period,
            total = counts.total_readings,
            critical = counts.critical,
            out_of_range = counts.out_of_range,
            escalations = counts.escalations,
            "Counted alert flags"
        );
        Ok(counts)
    }

    fn fetch_flagged_readings(
        &self,
        cohort: &Cohort,
        window: &DateWindow,
    ) -> Result<Vec<DeviceReading>, MetricsError> {
        Ok(self
            .per_chunk(cohort, |conn, ids| fetch_flagged_readings(conn, ids, window))?
            .into_iter()
            .flatten()
            .collect())
    }
}
