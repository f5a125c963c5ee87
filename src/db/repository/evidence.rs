use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::{EvidenceMap, EvidenceRecord, MetricBucket, SQL_DATETIME_FORMAT};

/// Outcome of replacing a summary's evidence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvidenceWriteReport {
    pub rows_written: usize,
    pub rows_failed: usize,
    pub batches_failed: usize,
}

/// An evidence row as stored.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredEvidence {
    pub patient_id: String,
    pub metric_name: String,
    pub metric_value: serde_json::Value,
    pub reading_timestamp: Option<String>,
}

/// Delete every evidence row of a summary. Returns the number removed.
pub fn delete_evidence(conn: &Connection, summary_id: i64) -> Result<usize, DatabaseError> {
    let removed = conn.execute(
        "DELETE FROM clinical_metrics_evidence WHERE summary_id = ?1",
        params![summary_id],
    )?;
    Ok(removed)
}

/// Insert one batch of rows in its own transaction. Nothing is written
/// if any row fails.
pub fn insert_evidence_batch(
    conn: &Connection,
    summary_id: i64,
    rows: &[(MetricBucket, &EvidenceRecord)],
) -> Result<usize, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO clinical_metrics_evidence
             (summary_id, patient_id, metric_name, metric_value, reading_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (bucket, record) in rows {
            let value = serde_json::to_string(&record.value)?;
            let timestamp = record
                .reading_timestamp
                .map(|ts| ts.format(SQL_DATETIME_FORMAT).to_string());
            stmt.execute(params![
                summary_id,
                record.patient_id,
                bucket.as_str(),
                value,
                timestamp,
            ])?;
        }
    }
    tx.commit()?;
    Ok(rows.len())
}

/// Replace all evidence of a summary: delete, then reinsert in batches of
/// `batch_size`. A failed batch is logged and skipped, the rest still land.
pub fn replace_evidence(
    conn: &Connection,
    summary_id: i64,
    evidence: &EvidenceMap,
    batch_size: usize,
) -> Result<EvidenceWriteReport, DatabaseError> {
    let removed = delete_evidence(conn, summary_id)?;
    tracing::debug!(summary_id, removed, "Cleared previous evidence");

    let rows: Vec<(MetricBucket, &EvidenceRecord)> = evidence.iter().collect();
    let mut report = EvidenceWriteReport::default();

    for (index, batch) in rows.chunks(batch_size.max(1)).enumerate() {
        match insert_evidence_batch(conn, summary_id, batch) {
            Ok(written) => report.rows_written += written,
            Err(e) => {
                tracing::warn!(
                    summary_id,
                    batch = index,
                    rows = batch.len(),
                    error = %e,
                    "Evidence batch failed, skipping"
                );
                report.rows_failed += batch.len();
                report.batches_failed += 1;
            }
        }
    }

    Ok(report)
}

/// Evidence rows of a summary in insertion order.
#[cfg(test)]
pub(crate) fn list_evidence(
    conn: &Connection,
    summary_id: i64,
) -> Result<Vec<StoredEvidence>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT patient_id, metric_name, metric_value, reading_timestamp
         FROM clinical_metrics_evidence
         WHERE summary_id = ?1
         ORDER BY id",
    )?;
    let rows = stmt.query_map(params![summary_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut evidence = Vec::new();
    for row in rows {
        let (patient_id, metric_name, raw_value, reading_timestamp) = row?;
        evidence.push(StoredEvidence {
            patient_id,
            metric_name,
            metric_value: serde_json::from_str(&raw_value)?,
            reading_timestamp,
        });
    }
    Ok(evidence)
}
