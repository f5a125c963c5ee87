use serde_json::json;

use super::ClassifierOutput;
use crate::db::AlertCounts;
use crate::models::{
    saturating_u32, AlertMetrics, BucketStat, DeviceReading, EvidenceMap, EvidenceRecord,
    MetricBucket,
};

/// Counts come from the flag-counting queries; `flagged` only feeds the
/// evidence rows and the per-bucket patient counts.
///
/// Out-of-range readings count as critical alerts as well, and the total
/// adds escalations on top of both.
pub fn classify_alerts(counts: AlertCounts, flagged: &[DeviceReading]) -> ClassifierOutput<AlertMetrics> {
    let mut evidence = EvidenceMap::new();

    for reading in flagged.iter().filter(|r| r.has_alert_flag()) {
        let value = json!({
            "device": reading.device_type.as_str(),
            "critical_alert": reading.critical_alert,
            "out_of_range_alert": reading.out_of_range_alert,
            "escalation": reading.escalation,
        });
        let record = EvidenceRecord::new(&reading.patient_id, value, reading.timestamp);

        if reading.critical_alert || reading.out_of_range_alert {
            evidence.push(MetricBucket::CriticalAlert, record.clone());
        }
        if reading.out_of_range_alert {
            evidence.push(MetricBucket::OutOfRangeAlert, record.clone());
        }
        if reading.escalation {
            evidence.push(MetricBucket::Escalation, record.clone());
        }
        evidence.push(MetricBucket::TotalAlerts, record);
    }

    let critical = counts.critical.saturating_add(counts.out_of_range);
    let total_alerts = critical.saturating_add(counts.escalations);
    let total = saturating_u32(counts.total_readings);
    let stat = |bucket, count: u64| {
        BucketStat::new(saturating_u32(count), total, evidence.distinct_patients(bucket))
    };

    let aggregate = AlertMetrics {
        total_readings: total,
        critical_alerts: stat(MetricBucket::CriticalAlert, critical),
        out_of_range_alerts: stat(MetricBucket::OutOfRangeAlert, counts.out_of_range),
        escalations: stat(MetricBucket::Escalation, counts.escalations),
        total_alerts: stat(MetricBucket::TotalAlerts, total_alerts),
    };

    ClassifierOutput { aggregate, evidence }
}
