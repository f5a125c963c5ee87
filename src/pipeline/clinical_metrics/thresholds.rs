//! Clinical thresholds. Fixed by clinical policy, not configurable.

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

// Blood pressure
pub const BP_NORMAL_SYS: Range = Range::new(90.0, 130.0);
pub const BP_NORMAL_DIA: Range = Range::new(60.0, 80.0);
pub const BP_NORMAL_HR: Range = Range::new(60.0, 100.0);
/// Diastolic floor paired with every elevated-systolic bucket.
pub const BP_ELEVATED_DIA: f64 = 80.0;
pub const BP_SYS_ELEVATED: [f64; 4] = [130.0, 140.0, 150.0, 160.0];
pub const BP_LOW_SYS: f64 = 90.0;
pub const BP_LOW_DIA: f64 = 60.0;
pub const BP_HR_LOW: f64 = 50.0;
pub const BP_HR_HIGH: f64 = 120.0;

// Pulse oximetry, checked in this order
pub const SPO2_MODERATE_LOW: Range = Range::new(90.0, 92.0);
pub const SPO2_LOW: Range = Range::new(88.0, 89.0);
pub const SPO2_CRITICAL_BELOW: f64 = 88.0;

// Glucose (mg/dL)
pub const GLUCOSE_FASTING_HIGH: [f64; 3] = [130.0, 160.0, 180.0];
pub const GLUCOSE_FASTING_LOW: f64 = 70.0;
pub const GLUCOSE_FASTING_SEVERE_LOW: f64 = 54.0;
pub const GLUCOSE_POST_MEAL_HIGH: [f64; 2] = [180.0, 200.0];
pub const GLUCOSE_RANDOM_HIGH: f64 = 200.0;
pub const GLUCOSE_RANDOM_LOW: f64 = 70.0;

/// Gain over baseline, in percent, above which a weight reading is flagged.
pub const WEIGHT_GAIN_THRESHOLD_PCT: f64 = 4.0;
