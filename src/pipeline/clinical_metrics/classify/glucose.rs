use super::ClassifierOutput;
use crate::models::{
    BucketStat, DeviceReading, EvidenceMap, EvidenceRecord, FastingGlucose, GlucoseMetrics,
    MetricBucket, PostMealGlucose, RandomGlucose,
};
use crate::pipeline::clinical_metrics::parser::{parse_glucose, GlucoseKind};
use crate::pipeline::clinical_metrics::thresholds::*;

impl GlucoseKind {
    /// Bucket holding every counted reading of this kind.
    pub fn reading_bucket(self) -> MetricBucket {
        match self {
            GlucoseKind::Fasting => MetricBucket::GlucoseFastingReading,
            GlucoseKind::PostMeal => MetricBucket::GlucosePostMealReading,
            GlucoseKind::Random => MetricBucket::GlucoseRandomReading,
        }
    }
}

/// Threshold buckets a positive glucose value of `kind` falls into.
/// High and low bands are cumulative within a kind.
pub fn glucose_buckets(kind: GlucoseKind, value: f64) -> Vec<MetricBucket> {
    let mut buckets = Vec::new();
    match kind {
        GlucoseKind::Fasting => {
            let highs = [
                MetricBucket::GlucoseFastingAbove130,
                MetricBucket::GlucoseFastingAbove160,
                MetricBucket::GlucoseFastingAbove180,
            ];
            for (bucket, limit) in highs.into_iter().zip(GLUCOSE_FASTING_HIGH) {
                if value > limit {
                    buckets.push(bucket);
                }
            }
            if value < GLUCOSE_FASTING_LOW {
                buckets.push(MetricBucket::GlucoseFastingBelow70);
            }
            if value < GLUCOSE_FASTING_SEVERE_LOW {
                buckets.push(MetricBucket::GlucoseFastingBelow54);
            }
        }
        GlucoseKind::PostMeal => {
            let highs = [
                MetricBucket::GlucosePostMealAbove180,
                MetricBucket::GlucosePostMealAbove200,
            ];
            for (bucket, limit) in highs.into_iter().zip(GLUCOSE_POST_MEAL_HIGH) {
                if value > limit {
                    buckets.push(bucket);
                }
            }
        }
        GlucoseKind::Random => {
            if value > GLUCOSE_RANDOM_HIGH {
                buckets.push(MetricBucket::GlucoseRandomAbove200);
            }
            if value < GLUCOSE_RANDOM_LOW {
                buckets.push(MetricBucket::GlucoseRandomBelow70);
            }
        }
    }
    buckets
}

/// Glucose percentages are relative to the counted readings of the same
/// kind, so a cohort measuring mostly fasting values is not diluted by
/// random ones. Non-positive values are left out entirely.
pub fn classify_glucose(readings: &[DeviceReading]) -> ClassifierOutput<GlucoseMetrics> {
    let mut evidence = EvidenceMap::new();

    for reading in readings {
        let Some(payload) = reading.payload_text() else {
            tracing::debug!(reading_id = reading.id, "Glucose reading without payload, not classified");
            continue;
        };

        let values = parse_glucose(payload, reading.entry_type.as_deref());
        let value = values.value.or_zero();
        if value <= 0.0 {
            continue;
        }

        let kind = values.kind();
        let record = EvidenceRecord::new(&reading.patient_id, values.to_json(), reading.timestamp);
        for bucket in glucose_buckets(kind, value) {
            evidence.push(bucket, record.clone());
        }
        evidence.push(kind.reading_bucket(), record);
    }

    let totals = |kind: GlucoseKind| {
        let bucket = kind.reading_bucket();
        (evidence.count(bucket), evidence.distinct_patients(bucket))
    };

    let (total, patients_count) = totals(GlucoseKind::Fasting);
    let stat = |bucket| BucketStat::from_evidence(&evidence, bucket, total);
    let fasting = FastingGlucose {
        total,
        patients_count,
        above_130: stat(MetricBucket::GlucoseFastingAbove130),
        above_160: stat(MetricBucket::GlucoseFastingAbove160),
        above_180: stat(MetricBucket::GlucoseFastingAbove180),
        below_70: stat(MetricBucket::GlucoseFastingBelow70),
        below_54: stat(MetricBucket::GlucoseFastingBelow54),
    };

    let (total, patients_count) = totals(GlucoseKind::PostMeal);
    let stat = |bucket| BucketStat::from_evidence(&evidence, bucket, total);
    let post_meal = PostMealGlucose {
        total,
        patients_count,
        above_180: stat(MetricBucket::GlucosePostMealAbove180),
        above_200: stat(MetricBucket::GlucosePostMealAbove200),
    };

    let (total, patients_count) = totals(GlucoseKind::Random);
    let stat = |bucket| BucketStat::from_evidence(&evidence, bucket, total);
    let random = RandomGlucose {
        total,
        patients_count,
        above_200: stat(MetricBucket::GlucoseRandomAbove200),
        below_70: stat(MetricBucket::GlucoseRandomBelow70),
    };

    ClassifierOutput {
        aggregate: GlucoseMetrics {
            fasting,
            post_meal,
            random,
        },
        evidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceType;
    use crate::pipeline::clinical_metrics::classify::test_support::reading;

    fn meter(patient: &str, payload: &str) -> DeviceReading {
        reading(patient, DeviceType::Glucose, payload)
    }

    #[test]
    fn untyped_reading_is_random() {
        let out = classify_glucose(&[meter("P1", r#"{"bloodGlucose":250}"#)]);
        let g = &out.aggregate;
        assert_eq!(g.random.total, 1);
        assert_eq!(g.random.above_200.count, 1);
        assert_eq!(g.fasting.total, 0);
        assert_eq!(g.post_meal.total, 0);
    }

    #[test]
    fn fasting_highs_are_cumulative() {
        assert_eq!(
            glucose_buckets(GlucoseKind::Fasting, 185.0),
            vec![
                MetricBucket::GlucoseFastingAbove130,
                MetricBucket::GlucoseFastingAbove160,
                MetricBucket::GlucoseFastingAbove180,
            ]
        );
        assert_eq!(
            glucose_buckets(GlucoseKind::Fasting, 140.0),
            vec![MetricBucket::GlucoseFastingAbove130]
        );
        assert!(glucose_buckets(GlucoseKind::Fasting, 130.0).is_empty());
    }

    #[test]
    fn fasting_lows_are_cumulative() {
        assert_eq!(
            glucose_buckets(GlucoseKind::Fasting, 50.0),
            vec![
                MetricBucket::GlucoseFastingBelow70,
                MetricBucket::GlucoseFastingBelow54,
            ]
        );
        assert_eq!(
            glucose_buckets(GlucoseKind::Fasting, 60.0),
            vec![MetricBucket::GlucoseFastingBelow70]
        );
    }

    #[test]
    fn post_meal_and_random_bands() {
        assert_eq!(
            glucose_buckets(GlucoseKind::PostMeal, 210.0),
            vec![
                MetricBucket::GlucosePostMealAbove180,
                MetricBucket::GlucosePostMealAbove200,
            ]
        );
        assert_eq!(
            glucose_buckets(GlucoseKind::Random, 65.0),
            vec![MetricBucket::GlucoseRandomBelow70]
        );
        assert!(glucose_buckets(GlucoseKind::PostMeal, 65.0).is_empty());
    }

    #[test]
    fn percentages_use_per_type_totals() {
        let out = classify_glucose(&[
            meter("P1", r#"{"bloodGlucose":170,"type":"Fasting"}"#),
            meter("P1", r#"{"bloodGlucose":100,"type":"fasting"}"#),
            meter("P2", r#"{"bloodGlucose":"190 mg/dL","type":"After Meal"}"#),
            meter("P3", r#"{"bloodGlucose":120}"#),
        ]);
        let g = &out.aggregate;
        assert_eq!(g.fasting.total, 2);
        assert_eq!(g.fasting.patients_count, 1);
        assert_eq!(g.fasting.above_160.count, 1);
        assert_eq!(g.fasting.above_160.percent, 50.0);
        assert_eq!(g.post_meal.total, 1);
        assert_eq!(g.post_meal.above_180.percent, 100.0);
        assert_eq!(g.random.total, 1);
        assert_eq!(g.random.above_200.count, 0);
    }

    #[test]
    fn entry_type_hint_resolves_kind() {
        let mut r = meter("P1", r#"{"bloodGlucose":150}"#);
        r.entry_type = Some("Post-Meal".into());
        let out = classify_glucose(&[r]);
        assert_eq!(out.aggregate.post_meal.total, 1);
        assert_eq!(
            out.evidence.records(MetricBucket::GlucosePostMealReading)[0].value["type"],
            "post-meal"
        );
    }

    #[test]
    fn non_positive_values_are_not_counted() {
        let out = classify_glucose(&[
            meter("P1", r#"{"bloodGlucose":0,"type":"fasting"}"#),
            meter("P2", r#"{"type":"fasting"}"#),
        ]);
        assert_eq!(out.aggregate, GlucoseMetrics::default());
        assert!(out.evidence.is_empty());
    }
}
