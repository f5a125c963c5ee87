use std::collections::HashSet;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::enums::{DeviceType, EnrollmentPeriod};

/// Timestamp format used by the telemetry and metric tables.
pub const SQL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single device transmission. Produced by the telemetry gateway;
/// read-only to the metrics pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReading {
    pub id: i64,
    pub patient_id: String,
    pub device_type: DeviceType,
    /// Semi-structured payload (`detailed_value`), usually JSON.
    pub payload: Option<String>,
    pub timestamp: NaiveDateTime,
    pub manual_entry: bool,
    /// Entry-type hint, used for glucose reading type when the payload has none.
    pub entry_type: Option<String>,
    pub critical_alert: bool,
    pub out_of_range_alert: bool,
    pub escalation: bool,
}

impl DeviceReading {
    /// Payload with surrounding whitespace removed, `None` when blank.
    pub fn payload_text(&self) -> Option<&str> {
        self.payload
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    pub fn has_alert_flag(&self) -> bool {
        self.critical_alert || self.out_of_range_alert || self.escalation
    }
}

/// Inclusive UTC timestamp bounds of a telemetry query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateWindow {
    /// Lookback window of an enrollment period relative to `now`.
    pub fn for_period(period: EnrollmentPeriod, now: NaiveDateTime) -> Self {
        let (oldest, newest) = period.lookback_days();
        Self {
            start: now - Duration::days(oldest),
            end: now - Duration::days(newest),
        }
    }

    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        *ts >= self.start && *ts <= self.end
    }

    pub fn start_sql(&self) -> String {
        self.start.format(SQL_DATETIME_FORMAT).to_string()
    }

    pub fn end_sql(&self) -> String {
        self.end.format(SQL_DATETIME_FORMAT).to_string()
    }
}

/// Patients enrolled at a practice within one enrollment period.
/// Ids are unique and keep first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cohort {
    pub practice_id: String,
    pub period: EnrollmentPeriod,
    patient_ids: Vec<String>,
}

impl Cohort {
    pub fn new(
        practice_id: impl Into<String>,
        period: EnrollmentPeriod,
        patient_ids: Vec<String>,
    ) -> Self {
        let mut seen = HashSet::with_capacity(patient_ids.len());
        let patient_ids = patient_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        Self {
            practice_id: practice_id.into(),
            period,
            patient_ids,
        }
    }

    pub fn patient_ids(&self) -> &[String] {
        &self.patient_ids
    }

    pub fn len(&self) -> usize {
        self.patient_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patient_ids.is_empty()
    }

    /// Patient ids split into query-sized chunks.
    pub fn chunks(&self, size: usize) -> std::slice::Chunks<'_, String> {
        self.patient_ids.chunks(size.max(1))
    }
}
