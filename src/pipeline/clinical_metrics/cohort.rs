//! Cohort lookup over the enrollment classifier's table.

use std::sync::Arc;

use rusqlite::Connection;

use super::error::MetricsError;
use super::traits::CohortProvider;
use crate::db::{get_enrolled_patients, PracticeRegistry};
use crate::models::{Cohort, EnrollmentPeriod};

/// Open a scoped connection to a registered practice.
pub(crate) fn open_practice(registry: &PracticeRegistry, practice_id: &str) -> Result<Connection, MetricsError> {
    if registry.get(practice_id).is_none() {
        return Err(MetricsError::UnknownPractice(practice_id.to_string()));
    }
    Ok(registry.open_db(practice_id)?)
}

/// Reads `patient_enrollment_periods` in the practice's own database.
pub struct SqliteCohortProvider {
    registry: Arc<PracticeRegistry>,
}

impl SqliteCohortProvider {
    pub fn new(registry: Arc<PracticeRegistry>) -> Self {
        Self { registry }
    }
}

impl CohortProvider for SqliteCohortProvider {
    fn get_cohort(&self, practice_id: &str, period: EnrollmentPeriod) -> Result<Cohort, MetricsError> {
        let conn = open_practice(&self.registry, practice_id)?;
        let patient_ids = get_enrolled_patients(&conn, practice_id, period).map_err(|e| {
            MetricsError::Cohort {
                practice_id: practice_id.to_string(),
                period,
                reason: e.to_string(),
            }
        })?;

        tracing::debug!(
            practice_id,
            period = %period,
            patients = patient_ids.len(),
            "Cohort loaded"
        );
        Ok(Cohort::new(practice_id, period, patient_ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::clinical_metrics::test_fixtures::PracticeFixture;

    #[test]
    fn loads_enrolled_patients_for_period() {
        let fx = PracticeFixture::new(&["north"]);
        fx.enroll("north", "a-1", EnrollmentPeriod::FirstMonth);
        fx.enroll("north", "a-2", EnrollmentPeriod::FirstMonth);
        fx.enroll("north", "a-3", EnrollmentPeriod::Overall);

        let provider = SqliteCohortProvider::new(fx.registry.clone());
        let cohort = provider.get_cohort("north", EnrollmentPeriod::FirstMonth).unwrap();
        assert_eq!(cohort.patient_ids(), ["a_1", "a_2"]);
        assert_eq!(cohort.period, EnrollmentPeriod::FirstMonth);
    }

    #[test]
    fn ids_that_normalize_alike_collapse() {
        let fx = PracticeFixture::new(&["north"]);
        fx.enroll("north", "P1", EnrollmentPeriod::FirstMonth);
        fx.enroll("north", "P-1", EnrollmentPeriod::FirstMonth);
        fx.enroll("north", "P_1", EnrollmentPeriod::FirstMonth);

        let provider = SqliteCohortProvider::new(fx.registry.clone());
        let cohort = provider.get_cohort("north", EnrollmentPeriod::FirstMonth).unwrap();
        assert_eq!(cohort.patient_ids(), ["P1", "P_1"]);
    }

    #[test]
    fn empty_period_is_an_empty_cohort() {
        let fx = PracticeFixture::new(&["north"]);
        let provider = SqliteCohortProvider::new(fx.registry.clone());
        let cohort = provider.get_cohort("north", EnrollmentPeriod::FourToSixMonths).unwrap();
        assert!(cohort.is_empty());
    }

    #[test]
    fn unknown_practice_is_rejected() {
        let fx = PracticeFixture::new(&["north"]);
        let provider = SqliteCohortProvider::new(fx.registry.clone());
        assert!(matches!(
            provider.get_cohort("south", EnrollmentPeriod::Overall),
            Err(MetricsError::UnknownPractice(id)) if id == "south"
        ));
    }

    #[test]
    fn missing_enrollment_table_is_a_cohort_error() {
        let fx = PracticeFixture::new(&["north"]);
        fx.conn("north")
            .execute_batch("DROP TABLE patient_enrollment_periods")
            .unwrap();
        let provider = SqliteCohortProvider::new(fx.registry.clone());
        assert!(matches!(
            provider.get_cohort("north", EnrollmentPeriod::Overall),
            Err(MetricsError::Cohort { .. })
        ));
    }
}
