use super::{distinct_patients, ClassifierOutput};
use crate::models::{average, BpMetrics, BucketStat, DeviceReading, EvidenceMap, EvidenceRecord, MetricBucket};
use crate::pipeline::clinical_metrics::parser::parse_bp;
use crate::pipeline::clinical_metrics::thresholds::*;

/// Vitals of one reading, missing fields read as zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BpVitals {
    pub sys: f64,
    pub dia: f64,
    pub hr: f64,
}

impl BpVitals {
    /// All three vitals within their normal ranges at once.
    pub fn is_normal(&self) -> bool {
        BP_NORMAL_SYS.contains(self.sys)
            && BP_NORMAL_DIA.contains(self.dia)
            && BP_NORMAL_HR.contains(self.hr)
    }
}

fn sys_gt_130_dia_gt_80(v: &BpVitals) -> bool {
    v.sys > BP_SYS_ELEVATED[0] && v.dia > BP_ELEVATED_DIA
}

fn sys_gt_140_dia_gt_80(v: &BpVitals) -> bool {
    v.sys > BP_SYS_ELEVATED[1] && v.dia > BP_ELEVATED_DIA
}

fn sys_gt_150_dia_gt_80(v: &BpVitals) -> bool {
    v.sys > BP_SYS_ELEVATED[2] && v.dia > BP_ELEVATED_DIA
}

fn sys_gt_160_dia_gt_80(v: &BpVitals) -> bool {
    v.sys > BP_SYS_ELEVATED[3] && v.dia > BP_ELEVATED_DIA
}

fn sys_lt_90_dia_lt_60(v: &BpVitals) -> bool {
    v.sys < BP_LOW_SYS && v.dia < BP_LOW_DIA
}

fn hr_abnormal(v: &BpVitals) -> bool {
    v.hr < BP_HR_LOW || v.hr > BP_HR_HIGH
}

/// Threshold buckets. Every rule is checked for every reading; the
/// elevated-systolic buckets are cumulative, so a reading in the >160
/// bucket is also in >150, >140 and >130.
pub const BP_RULES: [(MetricBucket, fn(&BpVitals) -> bool); 6] = [
    (MetricBucket::BpSysGt130DiaGt80, sys_gt_130_dia_gt_80),
    (MetricBucket::BpSysGt140DiaGt80, sys_gt_140_dia_gt_80),
    (MetricBucket::BpSysGt150DiaGt80, sys_gt_150_dia_gt_80),
    (MetricBucket::BpSysGt160DiaGt80, sys_gt_160_dia_gt_80),
    (MetricBucket::BpSysLt90DiaLt60, sys_lt_90_dia_lt_60),
    (MetricBucket::BpHrAbnormal, hr_abnormal),
];

/// Buckets a single reading falls into, besides `bp_reading`.
pub fn bp_buckets(vitals: &BpVitals, arrhythmia: bool) -> Vec<MetricBucket> {
    let mut buckets = Vec::new();
    if arrhythmia {
        buckets.push(MetricBucket::BpArrhythmia);
    }
    buckets.push(if vitals.is_normal() {
        MetricBucket::BpNormal
    } else {
        MetricBucket::BpAbnormal
    });
    buckets.extend(
        BP_RULES
            .iter()
            .filter(|(_, rule)| rule(vitals))
            .map(|(bucket, _)| *bucket),
    );
    buckets
}

pub fn classify_bp(readings: &[DeviceReading]) -> ClassifierOutput<BpMetrics> {
    let total = readings.len() as u32;
    let mut evidence = EvidenceMap::new();

    let (mut all_sys, mut all_dia, mut all_hr) = (Vec::new(), Vec::new(), Vec::new());
    let (mut normal_sys, mut normal_dia, mut normal_hr) = (Vec::new(), Vec::new(), Vec::new());

    for reading in readings {
        let Some(payload) = reading.payload_text() else {
            tracing::debug!(reading_id = reading.id, "BP reading without payload, not classified");
            continue;
        };

        let values = parse_bp(payload);
        let vitals = BpVitals {
            sys: values.sys.or_zero(),
            dia: values.dia.or_zero(),
            hr: values.hr.or_zero(),
        };

        // Averages only count vitals that were actually measured
        if vitals.sys > 0.0 {
            all_sys.push(vitals.sys);
        }
        if vitals.dia > 0.0 {
            all_dia.push(vitals.dia);
        }
        if vitals.hr > 0.0 {
            all_hr.push(vitals.hr);
        }
        if vitals.is_normal() {
            normal_sys.push(vitals.sys);
            normal_dia.push(vitals.dia);
            normal_hr.push(vitals.hr);
        }

        let record = EvidenceRecord::new(&reading.patient_id, values.to_json(), reading.timestamp);
        evidence.push(MetricBucket::BpReading, record.clone());
        for bucket in bp_buckets(&vitals, values.arrhythmia.or_zero() == 1) {
            evidence.push(bucket, record.clone());
        }
    }

    let stat = |bucket| BucketStat::from_evidence(&evidence, bucket, total);
    let aggregate = BpMetrics {
        total_readings: total,
        patients_count: distinct_patients(readings),
        normal: stat(MetricBucket::BpNormal),
        abnormal: stat(MetricBucket::BpAbnormal),
        arrhythmia: stat(MetricBucket::BpArrhythmia),
        sys_gt_130_dia_gt_80: stat(MetricBucket::BpSysGt130DiaGt80),
        sys_gt_140_dia_gt_80: stat(MetricBucket::BpSysGt140DiaGt80),
        sys_gt_150_dia_gt_80: stat(MetricBucket::BpSysGt150DiaGt80),
        sys_gt_160_dia_gt_80: stat(MetricBucket::BpSysGt160DiaGt80),
        sys_lt_90_dia_lt_60: stat(MetricBucket::BpSysLt90DiaLt60),
        hr_abnormal: stat(MetricBucket::BpHrAbnormal),
        avg_sys: average(&all_sys),
        avg_dia: average(&all_dia),
        avg_hr: average(&all_hr),
        normal_avg_sys: average(&normal_sys),
        normal_avg_dia: average(&normal_dia),
        normal_avg_hr: average(&normal_hr),
    };

    ClassifierOutput { aggregate, evidence }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceType;
    use crate::pipeline::clinical_metrics::classify::test_support::reading;

    fn vitals(sys: f64, dia: f64, hr: f64) -> BpVitals {
        BpVitals { sys, dia, hr }
    }

    fn bp(patient: &str, sys: u32, dia: u32, hr: u32) -> DeviceReading {
        reading(
            patient,
            DeviceType::BloodPressure,
            &format!(r#"{{"sysData":{sys},"diaData":{dia},"pulseData":{hr}}}"#),
        )
    }

    #[test]
    fn textbook_reading_is_normal() {
        let buckets = bp_buckets(&vitals(120.0, 70.0, 75.0), false);
        assert_eq!(buckets, vec![MetricBucket::BpNormal]);
    }

    #[test]
    fn elevated_145_hits_two_cumulative_buckets() {
        let buckets = bp_buckets(&vitals(145.0, 85.0, 75.0), false);
        assert!(buckets.contains(&MetricBucket::BpAbnormal));
        assert!(buckets.contains(&MetricBucket::BpSysGt130DiaGt80));
        assert!(buckets.contains(&MetricBucket::BpSysGt140DiaGt80));
        assert!(!buckets.contains(&MetricBucket::BpSysGt150DiaGt80));
        assert!(!buckets.contains(&MetricBucket::BpSysGt160DiaGt80));
    }

    #[test]
    fn elevated_165_hits_all_cumulative_buckets() {
        let buckets = bp_buckets(&vitals(165.0, 85.0, 75.0), false);
        for bucket in [
            MetricBucket::BpSysGt130DiaGt80,
            MetricBucket::BpSysGt140DiaGt80,
            MetricBucket::BpSysGt150DiaGt80,
            MetricBucket::BpSysGt160DiaGt80,
        ] {
            assert!(buckets.contains(&bucket), "missing {bucket}");
        }
    }

    #[test]
    fn high_systolic_needs_high_diastolic() {
        let buckets = bp_buckets(&vitals(170.0, 80.0, 75.0), false);
        assert!(!buckets.contains(&MetricBucket::BpSysGt130DiaGt80));
        assert!(buckets.contains(&MetricBucket::BpAbnormal));
    }

    #[test]
    fn cumulative_buckets_are_supersets() {
        for sys in (100..200).step_by(3) {
            let v = vitals(f64::from(sys), 90.0, 70.0);
            let rules: Vec<bool> = BP_RULES[..4].iter().map(|(_, r)| r(&v)).collect();
            for pair in rules.windows(2) {
                assert!(!pair[1] || pair[0], "sys {sys} breaks cumulative order");
            }
        }
    }

    #[test]
    fn low_pressure_and_heart_rate_buckets() {
        let buckets = bp_buckets(&vitals(85.0, 55.0, 45.0), true);
        assert!(buckets.contains(&MetricBucket::BpArrhythmia));
        assert!(buckets.contains(&MetricBucket::BpSysLt90DiaLt60));
        assert!(buckets.contains(&MetricBucket::BpHrAbnormal));
        assert!(bp_buckets(&vitals(120.0, 70.0, 121.0), false).contains(&MetricBucket::BpHrAbnormal));
    }

    #[test]
    fn two_patient_cohort() {
        let out = classify_bp(&[bp("P1", 150, 85, 70), bp("P2", 100, 65, 80)]);
        let m = &out.aggregate;
        assert_eq!(m.total_readings, 2);
        assert_eq!(m.patients_count, 2);
        assert_eq!(m.normal.count, 1);
        assert_eq!(m.abnormal.count, 1);
        assert_eq!(m.abnormal.percent, 50.0);
        assert_eq!(m.sys_gt_130_dia_gt_80.count, 1);
        assert_eq!(m.sys_gt_140_dia_gt_80.count, 1);
        assert_eq!(m.sys_gt_150_dia_gt_80.count, 0);
        assert_eq!(m.avg_sys, 125.0);
        assert_eq!(m.normal_avg_sys, 100.0);
        assert_eq!(out.evidence.count(MetricBucket::BpReading), 2);
        assert_eq!(out.evidence.records(MetricBucket::BpAbnormal)[0].patient_id, "P1");
    }

    #[test]
    fn average_skips_zero_systolic() {
        let readings = [
            reading("P1", DeviceType::BloodPressure, r#"{"sysData":0,"diaData":80,"pulseData":70}"#),
            bp("P2", 140, 90, 72),
        ];
        let m = classify_bp(&readings).aggregate;
        assert_eq!(m.avg_sys, 140.0);
        assert_eq!(m.avg_dia, 85.0);
        assert_eq!(m.avg_hr, 71.0);
    }

    #[test]
    fn empty_payload_counts_in_total_only() {
        let mut blank = bp("P1", 0, 0, 0);
        blank.payload = Some("  ".into());
        let out = classify_bp(&[blank, bp("P2", 120, 70, 75)]);
        let m = &out.aggregate;
        assert_eq!(m.total_readings, 2);
        assert_eq!(m.normal.count, 1);
        assert_eq!(m.normal.percent, 50.0);
        assert_eq!(m.abnormal.count, 0);
        assert_eq!(out.evidence.count(MetricBucket::BpReading), 1);
    }

    #[test]
    fn patient_counts_are_distinct() {
        let out = classify_bp(&[bp("P1", 150, 85, 70), bp("P1", 155, 90, 70), bp("P2", 120, 70, 70)]);
        assert_eq!(out.aggregate.abnormal.count, 2);
        assert_eq!(out.aggregate.abnormal.patients, 1);
        assert_eq!(out.aggregate.patients_count, 2);
    }

    #[test]
    fn no_readings_yields_zeros() {
        let out = classify_bp(&[]);
        assert_eq!(out.aggregate, BpMetrics::default());
        assert!(out.evidence.is_empty());
    }
}
