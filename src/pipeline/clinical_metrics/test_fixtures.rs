//! File-backed practice databases for pipeline tests.

use std::sync::Arc;

use rusqlite::{params, Connection};
use tempfile::TempDir;

use crate::db::sqlite::create_source_tables;
use crate::db::{PracticeHandle, PracticeRegistry};
use crate::models::EnrollmentPeriod;

pub struct PracticeFixture {
    _dir: TempDir,
    pub registry: Arc<PracticeRegistry>,
}

impl PracticeFixture {
    /// One database per practice id, each with the telemetry and
    /// enrollment tables but no metric tables yet.
    pub fn new(practice_ids: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let handles = practice_ids
            .iter()
            .map(|id| PracticeHandle {
                practice_id: id.to_string(),
                practice_name: id.to_string(),
                database_path: dir.path().join(format!("{id}.db")),
            })
            .collect();
        let registry = Arc::new(PracticeRegistry::new(handles));
        for id in practice_ids {
            create_source_tables(&registry.open_db(id).unwrap()).unwrap();
        }
        Self {
            _dir: dir,
            registry,
        }
    }

    pub fn conn(&self, practice_id: &str) -> Connection {
        self.registry.open_db(practice_id).unwrap()
    }

    pub fn enroll(&self, practice_id: &str, patient: &str, period: EnrollmentPeriod) {
        self.conn(practice_id)
            .execute(
                "INSERT INTO patient_enrollment_periods (patient_sub, practice_id, enrollment_period)
                 VALUES (?1, ?2, ?3)",
                params![patient, practice_id, period.as_str()],
            )
            .unwrap();
    }

    pub fn reading(&self, practice_id: &str, patient: &str, device: &str, payload: &str, ts: &str) {
        self.conn(practice_id)
            .execute(
                "INSERT INTO device_data_transmission (patient_sub, device_name, detailed_value, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![patient, device, payload, ts],
            )
            .unwrap();
    }

    pub fn flagged(&self, practice_id: &str, patient: &str, ts: &str, critical: bool, out_of_range: bool, escalation: bool) {
        self.conn(practice_id)
            .execute(
                "INSERT INTO device_data_transmission
                 (patient_sub, device_name, detailed_value, timestamp, critical_alert, out_of_range_alert, ext_alert)
                 VALUES (?1, 'BPM', '{}', ?2, ?3, ?4, ?5)",
                params![patient, ts, critical, out_of_range, escalation],
            )
            .unwrap();
    }
}
