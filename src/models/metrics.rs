use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::{EnrollmentPeriod, MetricBucket};
use super::evidence::EvidenceMap;

/// Round to two decimals, the precision of every stored percentage and average.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `count / total * 100` rounded to two decimals; 0 when `total` is 0.
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(count as f64 / total as f64 * 100.0)
}

/// Mean of the given values rounded to two decimals; 0 for an empty slice.
pub fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    round2(values.iter().sum::<f64>() / values.len() as f64)
}

/// Narrow a 64-bit counter for storage, saturating at `u32::MAX`.
pub fn saturating_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Count, percentage of the device total, and distinct patients of one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketStat {
    pub count: u32,
    pub percent: f64,
    pub patients: u32,
}

impl BucketStat {
    pub fn new(count: u32, total: u32, patients: u32) -> Self {
        Self {
            count,
            percent: percentage(u64::from(count), u64::from(total)),
            patients,
        }
    }

    /// Stat for `bucket` read off its evidence list.
    pub fn from_evidence(evidence: &EvidenceMap, bucket: MetricBucket, total: u32) -> Self {
        Self::new(
            evidence.count(bucket),
            total,
            evidence.distinct_patients(bucket),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BpMetrics {
    /// All fetched BP readings, including ones with an empty payload.
    pub total_readings: u32,
    pub patients_count: u32,
    pub normal: BucketStat,
    pub abnormal: BucketStat,
    pub arrhythmia: BucketStat,
    pub sys_gt_130_dia_gt_80: BucketStat,
    pub sys_gt_140_dia_gt_80: BucketStat,
    pub sys_gt_150_dia_gt_80: BucketStat,
    pub sys_gt_160_dia_gt_80: BucketStat,
    pub sys_lt_90_dia_lt_60: BucketStat,
    pub hr_abnormal: BucketStat,
    pub avg_sys: f64,
    pub avg_dia: f64,
    pub avg_hr: f64,
    pub normal_avg_sys: f64,
    pub normal_avg_dia: f64,
    pub normal_avg_hr: f64,
}

impl BpMetrics {
    pub fn bucket_stats(&self) -> Vec<(MetricBucket, BucketStat)> {
        vec![
            (MetricBucket::BpNormal, self.normal),
            (MetricBucket::BpAbnormal, self.abnormal),
            (MetricBucket::BpArrhythmia, self.arrhythmia),
            (MetricBucket::BpSysGt130DiaGt80, self.sys_gt_130_dia_gt_80),
            (MetricBucket::BpSysGt140DiaGt80, self.sys_gt_140_dia_gt_80),
            (MetricBucket::BpSysGt150DiaGt80, self.sys_gt_150_dia_gt_80),
            (MetricBucket::BpSysGt160DiaGt80, self.sys_gt_160_dia_gt_80),
            (MetricBucket::BpSysLt90DiaLt60, self.sys_lt_90_dia_lt_60),
            (MetricBucket::BpHrAbnormal, self.hr_abnormal),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spo2Metrics {
    pub total_readings: u32,
    pub patients_count: u32,
    pub band_90_92: BucketStat,
    pub band_88_89: BucketStat,
    pub below_88: BucketStat,
}

impl Spo2Metrics {
    pub fn bucket_stats(&self) -> Vec<(MetricBucket, BucketStat)> {
        vec![
            (MetricBucket::Spo2Band90To92, self.band_90_92),
            (MetricBucket::Spo2Band88To89, self.band_88_89),
            (MetricBucket::Spo2Below88, self.below_88),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightMetrics {
    pub total_readings: u32,
    pub patients_count: u32,
    pub gain_4pct: BucketStat,
}

impl WeightMetrics {
    pub fn bucket_stats(&self) -> Vec<(MetricBucket, BucketStat)> {
        vec![(MetricBucket::WeightGain4Pct, self.gain_4pct)]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FastingGlucose {
    pub total: u32,
    pub patients_count: u32,
    pub above_130: BucketStat,
    pub above_160: BucketStat,
    pub above_180: BucketStat,
    pub below_70: BucketStat,
    pub below_54: BucketStat,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostMealGlucose {
    pub total: u32,
    pub patients_count: u32,
    pub above_180: BucketStat,
    pub above_200: BucketStat,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RandomGlucose {
    pub total: u32,
    pub patients_count: u32,
    pub above_200: BucketStat,
    pub below_70: BucketStat,
}

/// Glucose statistics, split by reading type. Percentages are relative to
/// the total of their own type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlucoseMetrics {
    pub fasting: FastingGlucose,
    pub post_meal: PostMealGlucose,
    pub random: RandomGlucose,
}

impl GlucoseMetrics {
    pub fn bucket_stats(&self) -> Vec<(MetricBucket, BucketStat)> {
        vec![
            (MetricBucket::GlucoseFastingAbove130, self.fasting.above_130),
            (MetricBucket::GlucoseFastingAbove160, self.fasting.above_160),
            (MetricBucket::GlucoseFastingAbove180, self.fasting.above_180),
            (MetricBucket::GlucoseFastingBelow70, self.fasting.below_70),
            (MetricBucket::GlucoseFastingBelow54, self.fasting.below_54),
            (MetricBucket::GlucosePostMealAbove180, self.post_meal.above_180),
            (MetricBucket::GlucosePostMealAbove200, self.post_meal.above_200),
            (MetricBucket::GlucoseRandomAbove200, self.random.above_200),
            (MetricBucket::GlucoseRandomBelow70, self.random.below_70),
        ]
    }
}

/// Alert flag statistics over every device type.
///
/// `critical_alerts` includes out-of-range readings, and `total_alerts`
/// adds escalations on top of that, so an out-of-range reading is counted
/// twice in the total. Dashboards built on these columns expect it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertMetrics {
    pub total_readings: u32,
    pub critical_alerts: BucketStat,
    pub out_of_range_alerts: BucketStat,
    pub escalations: BucketStat,
    pub total_alerts: BucketStat,
}

impl AlertMetrics {
    pub fn bucket_stats(&self) -> Vec<(MetricBucket, BucketStat)> {
        vec![
            (MetricBucket::CriticalAlert, self.critical_alerts),
            (MetricBucket::OutOfRangeAlert, self.out_of_range_alerts),
            (MetricBucket::Escalation, self.escalations),
            (MetricBucket::TotalAlerts, self.total_alerts),
        ]
    }
}

/// One row of `clinical_metrics_summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub practice_id: String,
    pub period: EnrollmentPeriod,
    pub summary_date: NaiveDate,
    pub total_patients: u32,
    pub bp: BpMetrics,
    pub spo2: Spo2Metrics,
    pub weight: WeightMetrics,
    pub glucose: GlucoseMetrics,
    pub alerts: AlertMetrics,
}

impl MetricSummary {
    /// Every bucket stat of the summary, in column order.
    pub fn bucket_stats(&self) -> Vec<(MetricBucket, BucketStat)> {
        let mut stats = self.bp.bucket_stats();
        stats.extend(self.spo2.bucket_stats());
        stats.extend(self.weight.bucket_stats());
        stats.extend(self.glucose.bucket_stats());
        stats.extend(self.alerts.bucket_stats());
        stats
    }
}
