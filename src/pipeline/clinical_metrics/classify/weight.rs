use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::{distinct_patients, ClassifierOutput};
use crate::models::{
    round2, BucketStat, DeviceReading, EvidenceMap, EvidenceRecord, MetricBucket, WeightMetrics,
};
use crate::pipeline::clinical_metrics::parser::parse_weight;
use crate::pipeline::clinical_metrics::thresholds::WEIGHT_GAIN_THRESHOLD_PCT;

/// Percent change of `weight` relative to `baseline`.
pub fn percent_change(weight: f64, baseline: f64) -> f64 {
    (weight - baseline) / baseline * 100.0
}

/// `baselines` maps patient id to the weight of that patient's earliest
/// reading. Readings of patients without a baseline are counted in the
/// total but never flagged.
pub fn classify_weight(
    readings: &[DeviceReading],
    baselines: &BTreeMap<String, f64>,
) -> ClassifierOutput<WeightMetrics> {
    let total = readings.len() as u32;
    let mut evidence = EvidenceMap::new();

    for reading in readings {
        let Some(payload) = reading.payload_text() else {
            tracing::debug!(reading_id = reading.id, "Weight reading without payload, not classified");
            continue;
        };

        let values = parse_weight(payload);
        let weight = values.weight.or_zero();
        let baseline = baselines.get(&reading.patient_id).copied().filter(|b| *b > 0.0);

        let mut value = values.to_json();
        let mut gained = false;
        if let (Some(baseline), true) = (baseline, weight > 0.0) {
            let change = percent_change(weight, baseline);
            gained = change > WEIGHT_GAIN_THRESHOLD_PCT;
            if let Value::Object(map) = &mut value {
                map.insert("baseline".into(), json!(baseline));
                map.insert("change_percent".into(), json!(round2(change)));
            }
        }

        let record = EvidenceRecord::new(&reading.patient_id, value, reading.timestamp);
        if gained {
            evidence.push(MetricBucket::WeightGain4Pct, record.clone());
        }
        evidence.push(MetricBucket::WeightReading, record);
    }

    let aggregate = WeightMetrics {
        total_readings: total,
        patients_count: distinct_patients(readings),
        gain_4pct: BucketStat::from_evidence(&evidence, MetricBucket::WeightGain4Pct, total),
    };

    ClassifierOutput { aggregate, evidence }
}
