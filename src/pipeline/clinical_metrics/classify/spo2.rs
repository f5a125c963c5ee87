use super::{distinct_patients, ClassifierOutput};
use crate::models::{BucketStat, DeviceReading, EvidenceMap, EvidenceRecord, MetricBucket, Spo2Metrics};
use crate::pipeline::clinical_metrics::parser::parse_spo2;
use crate::pipeline::clinical_metrics::thresholds::*;

/// The single band a saturation value falls in. Bands are exclusive and
/// checked in priority order; non-positive values match none.
pub fn spo2_band(spo2: f64) -> Option<MetricBucket> {
    if spo2 <= 0.0 {
        None
    } else if SPO2_MODERATE_LOW.contains(spo2) {
        Some(MetricBucket::Spo2Band90To92)
    } else if SPO2_LOW.contains(spo2) {
        Some(MetricBucket::Spo2Band88To89)
    } else if spo2 < SPO2_CRITICAL_BELOW {
        Some(MetricBucket::Spo2Below88)
    } else {
        None
    }
}

pub fn classify_spo2(readings: &[DeviceReading]) -> ClassifierOutput<Spo2Metrics> {
    let total = readings.len() as u32;
    let mut evidence = EvidenceMap::new();

    for reading in readings {
        let Some(payload) = reading.payload_text() else {
            tracing::debug!(reading_id = reading.id, "SpO2 reading without payload, not classified");
            continue;
        };

        let values = parse_spo2(payload);
        let record = EvidenceRecord::new(&reading.patient_id, values.to_json(), reading.timestamp);
        if let Some(band) = spo2_band(values.spo2.or_zero()) {
            evidence.push(band, record.clone());
        }
        evidence.push(MetricBucket::Spo2Reading, record);
    }

    let stat = |bucket| BucketStat::from_evidence(&evidence, bucket, total);
    let aggregate = Spo2Metrics {
        total_readings: total,
        patients_count: distinct_patients(readings),
        band_90_92: stat(MetricBucket::Spo2Band90To92),
        band_88_89: stat(MetricBucket::Spo2Band88To89),
        below_88: stat(MetricBucket::Spo2Below88),
    };

    ClassifierOutput { aggregate, evidence }
}
