//! Read-only queries over `device_data_transmission`.
//!
//! Every function takes one chunk of patient ids; callers split the cohort.
//! Ids and device names are compared trimmed, since the gateway pads them.
//! Timestamps are compared through SQLite `datetime()`, which folds ISO-8601
//! and offset layouts into UTC `YYYY-MM-DD HH:MM:SS`; window bounds are UTC.

use chrono::{DateTime, NaiveDateTime};
use rusqlite::{params_from_iter, Connection};

use crate::db::DatabaseError;
use crate::models::{DateWindow, DeviceReading, DeviceType, SQL_DATETIME_FORMAT};

const READING_COLUMNS: &str = "id, trim(patient_sub), device_name, detailed_value, timestamp,
     manual_entry, entry_type, critical_alert, out_of_range_alert, ext_alert";

/// Raw flag counts over one or more chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertCounts {
    pub total_readings: u64,
    pub critical: u64,
    pub out_of_range: u64,
    pub escalations: u64,
}

impl AlertCounts {
    pub fn accumulate(&mut self, other: AlertCounts) {
        self.total_readings = self.total_readings.saturating_add(other.total_readings);
        self.critical = self.critical.saturating_add(other.critical);
        self.out_of_range = self.out_of_range.saturating_add(other.out_of_range);
        self.escalations = self.escalations.saturating_add(other.escalations);
    }
}

struct RawReading {
    id: i64,
    patient_id: String,
    device_name: String,
    payload: Option<String>,
    timestamp: String,
    manual_entry: bool,
    entry_type: Option<String>,
    critical_alert: bool,
    out_of_range_alert: bool,
    escalation: bool,
}

/// Readings of one device type for a chunk of patients, newest first.
pub fn fetch_device_readings(
    conn: &Connection,
    patient_ids: &[String],
    device: DeviceType,
    window: &DateWindow,
) -> Result<Vec<DeviceReading>, DatabaseError> {
    if patient_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {READING_COLUMNS}
         FROM device_data_transmission
         WHERE trim(patient_sub) IN ({})
           AND trim(device_name) = ?
           AND datetime(timestamp) >= datetime(?)
           AND datetime(timestamp) <= datetime(?)
         ORDER BY datetime(timestamp) DESC, id DESC",
        placeholders(patient_ids.len())
    );

    let mut params: Vec<String> = patient_ids.to_vec();
    params.push(device.as_str().to_string());
    params.push(window.start_sql());
    params.push(window.end_sql());

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), row_to_raw_reading)?;
    let raw = rows.collect::<Result<Vec<_>, _>>()?;

    Ok(raw
        .into_iter()
        .filter_map(|r| into_reading(r, Some(device)))
        .collect())
}

/// Readings of any device with at least one alert flag set, newest first.
/// Rows from unrecognized devices are left out.
pub fn fetch_flagged_readings(
    conn: &Connection,
    patient_ids: &[String],
    window: &DateWindow,
) -> Result<Vec<DeviceReading>, DatabaseError> {
    if patient_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {READING_COLUMNS}
         FROM device_data_transmission
         WHERE trim(patient_sub) IN ({})
           AND (critical_alert = 1 OR out_of_range_alert = 1 OR ext_alert = 1)
           AND datetime(timestamp) >= datetime(?)
           AND datetime(timestamp) <= datetime(?)
         ORDER BY datetime(timestamp) DESC, id DESC",
        placeholders(patient_ids.len())
    );

    let mut params: Vec<String> = patient_ids.to_vec();
    params.push(window.start_sql());
    params.push(window.end_sql());

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), row_to_raw_reading)?;
    let raw = rows.collect::<Result<Vec<_>, _>>()?;

    Ok(raw.into_iter().filter_map(|r| into_reading(r, None)).collect())
}

/// Flag counts for a chunk of patients within the window, all device types.
pub fn count_alert_flags(
    conn: &Connection,
    patient_ids: &[String],
    window: &DateWindow,
) -> Result<AlertCounts, DatabaseError> {
    if patient_ids.is_empty() {
        return Ok(AlertCounts::default());
    }

    let sql = format!(
        "SELECT COUNT(*),
                COALESCE(SUM(critical_alert = 1), 0),
                COALESCE(SUM(out_of_range_alert = 1), 0),
                COALESCE(SUM(ext_alert = 1), 0)
         FROM device_data_transmission
         WHERE trim(patient_sub) IN ({})
           AND datetime(timestamp) >= datetime(?)
           AND datetime(timestamp) <= datetime(?)",
        placeholders(patient_ids.len())
    );

    let mut params: Vec<String> = patient_ids.to_vec();
    params.push(window.start_sql());
    params.push(window.end_sql());

    let counts = conn.query_row(&sql, params_from_iter(params.iter()), |row| {
        Ok(AlertCounts {
            total_readings: non_negative(row.get(0)?),
            critical: non_negative(row.get(1)?),
            out_of_range: non_negative(row.get(2)?),
            escalations: non_negative(row.get(3)?),
        })
    })?;
    Ok(counts)
}

/// Payload of each patient's earliest-ever reading of `device`, regardless
/// of any date window. Returns `(patient_id, payload)` pairs.
pub fn fetch_earliest_payloads(
    conn: &Connection,
    patient_ids: &[String],
    device: DeviceType,
) -> Result<Vec<(String, String)>, DatabaseError> {
    if patient_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT trim(t1.patient_sub), t1.detailed_value
         FROM device_data_transmission t1
         INNER JOIN (SELECT trim(patient_sub) AS patient_id, MIN(datetime(timestamp)) AS earliest
                     FROM device_data_transmission
                     WHERE trim(patient_sub) IN ({})
                       AND trim(device_name) = ?
                       AND detailed_value IS NOT NULL
                     GROUP BY trim(patient_sub)) t2
            ON trim(t1.patient_sub) = t2.patient_id AND datetime(t1.timestamp) = t2.earliest
         WHERE trim(t1.device_name) = ?
           AND t1.detailed_value IS NOT NULL
         ORDER BY t1.id",
        placeholders(patient_ids.len())
    );

    let mut params: Vec<String> = patient_ids.to_vec();
    params.push(device.as_str().to_string());
    params.push(device.as_str().to_string());

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Parse a stored timestamp. Accepts the SQL layout as well as ISO-8601
/// with or without an offset.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, SQL_DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn row_to_raw_reading(row: &rusqlite::Row) -> Result<RawReading, rusqlite::Error> {
    Ok(RawReading {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        device_name: row.get(2)?,
        payload: row.get(3)?,
        timestamp: row.get(4)?,
        manual_entry: row.get::<_, Option<i64>>(5)?.unwrap_or(0) != 0,
        entry_type: row.get(6)?,
        critical_alert: row.get::<_, Option<i64>>(7)?.unwrap_or(0) != 0,
        out_of_range_alert: row.get::<_, Option<i64>>(8)?.unwrap_or(0) != 0,
        escalation: row.get::<_, Option<i64>>(9)?.unwrap_or(0) != 0,
    })
}

fn into_reading(raw: RawReading, device: Option<DeviceType>) -> Option<DeviceReading> {
    let Some(timestamp) = parse_timestamp(&raw.timestamp) else {
        tracing::warn!(
            reading_id = raw.id,
            timestamp = %raw.timestamp,
            "Skipping reading with unparsable timestamp"
        );
        return None;
    };
    let Some(device_type) = device.or_else(|| DeviceType::from_stored(&raw.device_name)) else {
        tracing::debug!(
            reading_id = raw.id,
            device = %raw.device_name,
            "Skipping reading from unrecognized device"
        );
        return None;
    };

    Some(DeviceReading {
        id: raw.id,
        patient_id: raw.patient_id,
        device_type,
        payload: raw.payload,
        timestamp,
        manual_entry: raw.manual_entry,
        entry_type: raw.entry_type,
        critical_alert: raw.critical_alert,
        out_of_range_alert: raw.out_of_range_alert,
        escalation: raw.escalation,
    })
}
