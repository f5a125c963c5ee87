use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// Device names as written by the telemetry gateway (matched trimmed).
str_enum!(DeviceType {
    BloodPressure => "BPM",
    PulseOximeter => "Oxymeter",
    Weight => "Weight",
    Glucose => "Blood Glucose",
});

str_enum!(EnrollmentPeriod {
    FirstMonth => "first_month",
    OneToThreeMonths => "1_3_months",
    FourToSixMonths => "4_6_months",
    SixToTwelveMonths => "6_12_months",
    Overall => "overall",
});

// Evidence bucket names, as stored in `clinical_metrics_evidence.metric_name`.
str_enum!(MetricBucket {
    BpReading => "bp_reading",
    BpNormal => "bp_normal",
    BpAbnormal => "bp_abnormal",
    BpArrhythmia => "bp_arrhythmia",
    BpSysGt130DiaGt80 => "bp_sys_gt_130_dia_gt_80",
    BpSysGt140DiaGt80 => "bp_sys_gt_140_dia_gt_80",
    BpSysGt150DiaGt80 => "bp_sys_gt_150_dia_gt_80",
    BpSysGt160DiaGt80 => "bp_sys_gt_160_dia_gt_80",
    BpSysLt90DiaLt60 => "bp_sys_lt_90_dia_lt_60",
    BpHrAbnormal => "bp_hr_abnormal",
    Spo2Reading => "spo2_reading",
    Spo2Band90To92 => "spo2_90_92",
    Spo2Band88To89 => "spo2_88_89",
    Spo2Below88 => "spo2_below_88",
    WeightReading => "weight_reading",
    WeightGain4Pct => "weight_gain_4pct",
    GlucoseFastingReading => "glucose_fasting_reading",
    GlucoseFastingAbove130 => "glucose_fasting_above_130",
    GlucoseFastingAbove160 => "glucose_fasting_above_160",
    GlucoseFastingAbove180 => "glucose_fasting_above_180",
    GlucoseFastingBelow70 => "glucose_fasting_below_70",
    GlucoseFastingBelow54 => "glucose_fasting_below_54",
    GlucosePostMealReading => "glucose_postmeal_reading",
    GlucosePostMealAbove180 => "glucose_postmeal_above_180",
    GlucosePostMealAbove200 => "glucose_postmeal_above_200",
    GlucoseRandomReading => "glucose_random_reading",
    GlucoseRandomAbove200 => "glucose_random_above_200",
    GlucoseRandomBelow70 => "glucose_random_below_70",
    CriticalAlert => "critical_alert",
    OutOfRangeAlert => "out_of_range_alert",
    Escalation => "escalation",
    TotalAlerts => "total_alerts",
});

impl DeviceType {
    pub const ALL: [DeviceType; 4] = [
        DeviceType::BloodPressure,
        DeviceType::PulseOximeter,
        DeviceType::Weight,
        DeviceType::Glucose,
    ];

    /// Parse a stored device name, tolerating surrounding whitespace.
    pub fn from_stored(s: &str) -> Option<Self> {
        s.trim().parse().ok()
    }
}

impl EnrollmentPeriod {
    /// Processing order of a run.
    pub const ALL: [EnrollmentPeriod; 5] = [
        EnrollmentPeriod::FirstMonth,
        EnrollmentPeriod::OneToThreeMonths,
        EnrollmentPeriod::FourToSixMonths,
        EnrollmentPeriod::SixToTwelveMonths,
        EnrollmentPeriod::Overall,
    ];

    /// Lookback in days as `(oldest, newest)` relative to now.
    pub fn lookback_days(self) -> (i64, i64) {
        match self {
            EnrollmentPeriod::FirstMonth => (30, 0),
            EnrollmentPeriod::OneToThreeMonths => (90, 30),
            EnrollmentPeriod::FourToSixMonths => (180, 90),
            EnrollmentPeriod::SixToTwelveMonths => (365, 180),
            EnrollmentPeriod::Overall => (3650, 0),
        }
    }
}

impl MetricBucket {
    /// Prefix of the summary columns aggregated from this bucket
    /// (`<prefix>_count`, `<prefix>_percent`, `<prefix>_patients_count`).
    /// Per-reading buckets feed the device-level patient count instead.
    pub fn column_prefix(self) -> Option<&'static str> {
        match self {
            MetricBucket::BpReading
            | MetricBucket::Spo2Reading
            | MetricBucket::WeightReading
            | MetricBucket::GlucoseFastingReading
            | MetricBucket::GlucosePostMealReading
            | MetricBucket::GlucoseRandomReading => None,
            MetricBucket::CriticalAlert => Some("critical_alerts"),
            MetricBucket::OutOfRangeAlert => Some("out_of_range_alerts"),
            MetricBucket::Escalation => Some("escalations"),
            other => Some(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn device_type_roundtrip() {
        for device in DeviceType::ALL {
            assert_eq!(DeviceType::from_str(device.as_str()).unwrap(), device);
        }
    }

    #[test]
    fn device_type_tolerates_padding() {
        assert_eq!(DeviceType::from_stored(" BPM"), Some(DeviceType::BloodPressure));
        assert_eq!(
            DeviceType::from_stored(" Blood Glucose "),
            Some(DeviceType::Glucose)
        );
        assert_eq!(DeviceType::from_stored("Thermometer"), None);
    }

    #[test]
    fn unknown_period_is_invalid_enum() {
        let result = EnrollmentPeriod::from_str("2_years");
        assert!(matches!(result, Err(DatabaseError::InvalidEnum { .. })));
    }

    #[test]
    fn periods_in_processing_order() {
        let names: Vec<&str> = EnrollmentPeriod::ALL.iter().map(|p| p.as_str()).collect();
        assert_eq!(
            names,
            vec!["first_month", "1_3_months", "4_6_months", "6_12_months", "overall"]
        );
    }

    #[test]
    fn lookback_windows_are_ordered() {
        for period in EnrollmentPeriod::ALL {
            let (oldest, newest) = period.lookback_days();
            assert!(oldest > newest, "{period} has an empty window");
        }
        assert_eq!(EnrollmentPeriod::Overall.lookback_days(), (3650, 0));
    }

    #[test]
    fn alert_buckets_use_plural_columns() {
        assert_eq!(
            MetricBucket::CriticalAlert.column_prefix(),
            Some("critical_alerts")
        );
        assert_eq!(MetricBucket::Escalation.column_prefix(), Some("escalations"));
        assert_eq!(MetricBucket::TotalAlerts.column_prefix(), Some("total_alerts"));
    }

    #[test]
    fn reading_buckets_have_no_columns() {
        assert_eq!(MetricBucket::BpReading.column_prefix(), None);
        assert_eq!(MetricBucket::GlucoseRandomReading.column_prefix(), None);
        assert_eq!(
            MetricBucket::BpSysGt150DiaGt80.column_prefix(),
            Some("bp_sys_gt_150_dia_gt_80")
        );
    }

    #[test]
    fn bucket_displays_stored_name() {
        assert_eq!(MetricBucket::Spo2Below88.to_string(), "spo2_below_88");
        assert_eq!(EnrollmentPeriod::OneToThreeMonths.to_string(), "1_3_months");
    }
}
