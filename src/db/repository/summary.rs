//! `clinical_metrics_summary`: one row per (practice, enrollment period),
//! overwritten by every run.

#[cfg(test)]
use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::{EnrollmentPeriod, MetricSummary, SQL_DATETIME_FORMAT};

/// Row bookkeeping, excluded when comparing stored metrics.
#[cfg(test)]
const BOOKKEEPING_COLUMNS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Metric columns of a summary with their values, in a stable order.
pub fn summary_columns(summary: &MetricSummary) -> Vec<(String, Value)> {
    let mut cols: Vec<(String, Value)> = Vec::new();
    let mut int = |name: &str, v: u32| cols.push((name.to_string(), Value::Integer(i64::from(v))));

    int("total_patients", summary.total_patients);
    int("bp_total_readings", summary.bp.total_readings);
    int("bp_patients_count", summary.bp.patients_count);
    int("spo2_total_readings", summary.spo2.total_readings);
    int("spo2_patients_count", summary.spo2.patients_count);
    int("weight_total_readings", summary.weight.total_readings);
    int("weight_patients_count", summary.weight.patients_count);
    int("glucose_fasting_total", summary.glucose.fasting.total);
    int("glucose_fasting_patients_count", summary.glucose.fasting.patients_count);
    int("glucose_postmeal_total", summary.glucose.post_meal.total);
    int("glucose_postmeal_patients_count", summary.glucose.post_meal.patients_count);
    int("glucose_random_total", summary.glucose.random.total);
    int("glucose_random_patients_count", summary.glucose.random.patients_count);
    int("alert_total_readings", summary.alerts.total_readings);

    let bp = &summary.bp;
    for (name, v) in [
        ("bp_avg_sys", bp.avg_sys),
        ("bp_avg_dia", bp.avg_dia),
        ("bp_avg_hr", bp.avg_hr),
        ("bp_normal_avg_sys", bp.normal_avg_sys),
        ("bp_normal_avg_dia", bp.normal_avg_dia),
        ("bp_normal_avg_hr", bp.normal_avg_hr),
    ] {
        cols.push((name.to_string(), Value::Real(v)));
    }

    for (bucket, stat) in summary.bucket_stats() {
        let Some(prefix) = bucket.column_prefix() else {
            continue;
        };
        cols.push((
            format!("{prefix}_count"),
            Value::Integer(i64::from(stat.count)),
        ));
        cols.push((format!("{prefix}_percent"), Value::Real(stat.percent)));
        cols.push((
            format!("{prefix}_patients_count"),
            Value::Integer(i64::from(stat.patients)),
        ));
    }

    cols
}

/// Id of the summary row for a practice and period, if one exists.
pub fn find_summary_id(
    conn: &Connection,
    practice_id: &str,
    period: EnrollmentPeriod,
) -> Result<Option<i64>, DatabaseError> {
    conn.query_row(
        "SELECT id FROM clinical_metrics_summary
         WHERE practice_id = ?1 AND enrollment_period = ?2",
        params![practice_id, period.as_str()],
        |row| row.get(0),
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// Update the row for `(practice, period)` in place, or insert it.
/// Returns the summary id either way.
pub fn upsert_summary(
    conn: &Connection,
    summary: &MetricSummary,
    now: NaiveDateTime,
) -> Result<i64, DatabaseError> {
    let columns = summary_columns(summary);
    let now_str = now.format(SQL_DATETIME_FORMAT).to_string();
    let summary_date = summary.summary_date.format("%Y-%m-%d").to_string();

    if let Some(id) = find_summary_id(conn, &summary.practice_id, summary.period)? {
        let assignments: Vec<String> = columns
            .iter()
            .map(|(name, _)| format!("{name} = ?"))
            .collect();
        let sql = format!(
            "UPDATE clinical_metrics_summary
             SET summary_date = ?, {}, updated_at = ?
             WHERE id = ?",
            assignments.join(", ")
        );

        let mut values: Vec<Value> = Vec::with_capacity(columns.len() + 3);
        values.push(Value::Text(summary_date));
        values.extend(columns.into_iter().map(|(_, v)| v));
        values.push(Value::Text(now_str));
        values.push(Value::Integer(id));

        conn.execute(&sql, params_from_iter(values))?;
        return Ok(id);
    }

    let names: Vec<&str> = columns.iter().map(|(name, _)| name.as_str()).collect();
    let sql = format!(
        "INSERT INTO clinical_metrics_summary
         (practice_id, enrollment_period, summary_date, {}, created_at, updated_at)
         VALUES ({})",
        names.join(", "),
        vec!["?"; columns.len() + 5].join(", ")
    );

    let mut values: Vec<Value> = Vec::with_capacity(columns.len() + 5);
    values.push(Value::Text(summary.practice_id.clone()));
    values.push(Value::Text(summary.period.as_str().to_string()));
    values.push(Value::Text(summary_date));
    values.extend(columns.into_iter().map(|(_, v)| v));
    values.push(Value::Text(now_str.clone()));
    values.push(Value::Text(now_str));

    conn.execute(&sql, params_from_iter(values))?;
    Ok(conn.last_insert_rowid())
}

/// Every metric column of a stored summary, keyed by column name.
/// Bookkeeping columns (`id`, timestamps) are left out.
#[cfg(test)]
pub(crate) fn load_summary_metrics(
    conn: &Connection,
    summary_id: i64,
) -> Result<BTreeMap<String, Value>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM clinical_metrics_summary WHERE id = ?1")?;
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

    let row = stmt
        .query_row(params![summary_id], |row| {
            let mut values = BTreeMap::new();
            for (i, name) in names.iter().enumerate() {
                if BOOKKEEPING_COLUMNS.contains(&name.as_str()) {
                    continue;
                }
                values.insert(name.clone(), row.get::<_, Value>(i)?);
            }
            Ok(values)
        })
        .optional()?;

    row.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "clinical_metrics_summary".into(),
        id: summary_id.to_string(),
    })
}
