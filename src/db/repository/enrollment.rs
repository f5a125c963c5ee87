use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::EnrollmentPeriod;

/// Patients the enrollment classifier placed in `period` for a practice,
/// in insertion order. Dashes in ids are normalized to underscores.
pub fn get_enrolled_patients(
    conn: &Connection,
    practice_id: &str,
    period: EnrollmentPeriod,
) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT replace(trim(patient_sub), '-', '_')
         FROM patient_enrollment_periods
         WHERE practice_id = ?1
           AND enrollment_period = ?2
         ORDER BY id",
    )?;
    let rows = stmt.query_map(params![practice_id, period.as_str()], |row| {
        row.get::<_, String>(0)
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::{create_source_tables, open_memory_database};

    fn enroll(conn: &Connection, practice: &str, period: &str, patient: &str) {
        conn.execute(
            "INSERT INTO patient_enrollment_periods (patient_sub, practice_id, enrollment_period)
             VALUES (?1, ?2, ?3)",
            params![patient, practice, period],
        )
        .unwrap();
    }

    #[test]
    fn returns_only_matching_practice_and_period() {
        let conn = open_memory_database().unwrap();
        create_source_tables(&conn).unwrap();
        enroll(&conn, "pr1", "first_month", "a");
        enroll(&conn, "pr1", "overall", "b");
        enroll(&conn, "pr2", "first_month", "c");
        enroll(&conn, "pr1", "first_month", "d");

        let patients = get_enrolled_patients(&conn, "pr1", EnrollmentPeriod::FirstMonth).unwrap();
        assert_eq!(patients, vec!["a", "d"]);
    }

    #[test]
    fn dashes_become_underscores() {
        let conn = open_memory_database().unwrap();
        create_source_tables(&conn).unwrap();
        enroll(&conn, "pr1", "overall", " us-east-1:abc-def ");

        let patients = get_enrolled_patients(&conn, "pr1", EnrollmentPeriod::Overall).unwrap();
        assert_eq!(patients, vec!["us_east_1:abc_def"]);
    }

    #[test]
    fn missing_table_is_an_error() {
        let conn = open_memory_database().unwrap();
        assert!(get_enrolled_patients(&conn, "pr1", EnrollmentPeriod::Overall).is_err());
    }
}
