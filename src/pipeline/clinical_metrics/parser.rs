//! Device payload decoding.
//!
//! Payloads are written by several device firmwares and are not reliably
//! JSON: some are truncated, some use single objects nested under vendor
//! keys. Decoding never fails. Well-formed JSON is flattened to its scalar
//! fields; anything else falls back to a key/value scan of the raw text.
//! Each field comes back as [`Field::Present`] or [`Field::Missing`].

use std::collections::{HashMap, VecDeque};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

/// A decoded payload field. Absence is distinct from zero.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Present(T),
    Missing,
}

impl Field<f64> {
    /// Missing reads as zero, which no threshold accepts as a valid vital.
    pub fn or_zero(&self) -> f64 {
        match self {
            Field::Present(v) => *v,
            Field::Missing => 0.0,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Field::Present(v) => number_json(*v),
            Field::Missing => Value::Null,
        }
    }
}

impl Field<i64> {
    pub fn or_zero(&self) -> i64 {
        match self {
            Field::Present(v) => *v,
            Field::Missing => 0,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Field::Present(v) => json!(v),
            Field::Missing => Value::Null,
        }
    }
}

impl Field<String> {
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Field::Present(v) => Some(v.as_str()),
            Field::Missing => None,
        }
    }
}

/// Flat view of a payload: key → scalar text. The first occurrence of a
/// key wins, shallower keys before nested ones.
#[derive(Debug, Clone, Default)]
pub struct PayloadFields {
    values: HashMap<String, String>,
}

static KEY_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([A-Za-z0-9_]+)"\s*:\s*(?:"([^"]*)"|([^,}\]\s]+))"#).expect("valid regex")
});

static LEADING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(?:\.\d+)?").expect("valid regex"));

impl PayloadFields {
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => Self::from_json(value),
            _ => Self::scan(raw),
        }
    }

    fn from_json(root: Value) -> Self {
        let mut values = HashMap::new();
        let mut queue = VecDeque::from([root]);

        while let Some(node) = queue.pop_front() {
            let Value::Object(map) = node else { continue };
            for (key, value) in map {
                if value.is_object() {
                    queue.push_back(value);
                    continue;
                }
                let text = match value {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                values.entry(key).or_insert(text);
            }
        }

        Self { values }
    }

    fn scan(raw: &str) -> Self {
        let mut values = HashMap::new();
        for caps in KEY_VALUE_RE.captures_iter(raw) {
            let key = caps[1].to_string();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            values.entry(key).or_insert(value);
        }
        Self { values }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Numeric field. Quoted numbers and trailing units (`"120 mmHg"`)
    /// are accepted; anything without a leading number is missing.
    pub fn number(&self, key: &str) -> Field<f64> {
        let Some(text) = self.text(key) else {
            return Field::Missing;
        };
        let text = text.trim();
        if let Ok(v) = text.parse::<f64>() {
            if v.is_finite() {
                return Field::Present(v);
            }
            return Field::Missing;
        }
        LEADING_NUMBER_RE
            .find(text)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .map_or(Field::Missing, Field::Present)
    }

    pub fn integer(&self, key: &str) -> Field<i64> {
        match self.number(key) {
            Field::Present(v) => Field::Present(v.trunc() as i64),
            Field::Missing => Field::Missing,
        }
    }

    pub fn boolean(&self, key: &str) -> Field<bool> {
        match self.text(key).map(|t| t.trim().to_ascii_lowercase()) {
            Some(t) if t == "true" => Field::Present(true),
            Some(t) if t == "false" => Field::Present(false),
            _ => Field::Missing,
        }
    }
}

fn number_json(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        json!(v as i64)
    } else {
        json!(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BpValues {
    pub sys: Field<f64>,
    pub dia: Field<f64>,
    pub hr: Field<f64>,
    pub arrhythmia: Field<i64>,
}

impl BpValues {
    pub fn to_json(&self) -> Value {
        json!({
            "sys": self.sys.to_json(),
            "dia": self.dia.to_json(),
            "hr": self.hr.to_json(),
            "arrhythmia": self.arrhythmia.to_json(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spo2Values {
    pub spo2: Field<f64>,
    pub pulse: Field<f64>,
}

impl Spo2Values {
    pub fn to_json(&self) -> Value {
        json!({ "spo2": self.spo2.to_json(), "pr": self.pulse.to_json() })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightValues {
    pub weight: Field<f64>,
    pub height: Field<f64>,
    pub bmi: Field<f64>,
}

impl WeightValues {
    pub fn to_json(&self) -> Value {
        json!({
            "weight": self.weight.to_json(),
            "height": self.height.to_json(),
            "bmi": self.bmi.to_json(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlucoseValues {
    pub value: Field<f64>,
    /// Lower-cased reading type (`fasting`, `post meal`, ...).
    pub reading_type: Field<String>,
}

impl GlucoseValues {
    pub fn kind(&self) -> GlucoseKind {
        GlucoseKind::from_type(self.reading_type.as_deref())
    }

    pub fn to_json(&self) -> Value {
        json!({
            "glucose": self.value.to_json(),
            "type": self.reading_type.as_deref(),
        })
    }
}

/// Glucose reading category, derived from the free-text type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlucoseKind {
    Fasting,
    PostMeal,
    Random,
}

impl GlucoseKind {
    pub fn from_type(reading_type: Option<&str>) -> Self {
        let t = reading_type.unwrap_or_default().to_lowercase();
        if t.contains("fasting") {
            GlucoseKind::Fasting
        } else if t.contains("post") || t.contains("meal") {
            GlucoseKind::PostMeal
        } else {
            GlucoseKind::Random
        }
    }
}

pub fn parse_bp(raw: &str) -> BpValues {
    let fields = PayloadFields::parse(raw);
    let arrhythmia = match fields.integer("arrhythmia") {
        Field::Present(v) => Field::Present(v),
        Field::Missing => match fields.boolean("ihb") {
            Field::Present(b) => Field::Present(i64::from(b)),
            Field::Missing => Field::Missing,
        },
    };
    BpValues {
        sys: fields.number("sysData"),
        dia: fields.number("diaData"),
        hr: fields.number("pulseData"),
        arrhythmia,
    }
}

pub fn parse_spo2(raw: &str) -> Spo2Values {
    let fields = PayloadFields::parse(raw);
    Spo2Values {
        spo2: fields.number("spo2"),
        pulse: fields.number("pr"),
    }
}

pub fn parse_weight(raw: &str) -> WeightValues {
    let fields = PayloadFields::parse(raw);
    WeightValues {
        weight: fields.number("weight"),
        height: fields.number("height"),
        bmi: fields.number("bmi"),
    }
}

/// `entry_type` is the reading's entry-type hint, used when the payload
/// carries no `type`.
pub fn parse_glucose(raw: &str, entry_type: Option<&str>) -> GlucoseValues {
    let fields = PayloadFields::parse(raw);
    let reading_type = fields
        .text("type")
        .or(entry_type)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| Field::Present(t.to_lowercase()))
        .unwrap_or(Field::Missing);
    GlucoseValues {
        value: fields.number("bloodGlucose"),
        reading_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bp_from_json() {
        let bp = parse_bp(r#"{"sysData": 150, "diaData": "85", "pulseData": 70, "arrhythmia": 1}"#);
        assert_eq!(bp.sys, Field::Present(150.0));
        assert_eq!(bp.dia, Field::Present(85.0));
        assert_eq!(bp.hr, Field::Present(70.0));
        assert_eq!(bp.arrhythmia, Field::Present(1));
    }

    #[test]
    fn bp_ihb_fallback() {
        let bp = parse_bp(r#"{"sysData":120,"diaData":70,"pulseData":75,"ihb":true}"#);
        assert_eq!(bp.arrhythmia, Field::Present(1));
        let bp = parse_bp(r#"{"sysData":120,"ihb":"FALSE"}"#);
        assert_eq!(bp.arrhythmia, Field::Present(0));
    }

    #[test]
    fn missing_differs_from_zero() {
        let bp = parse_bp(r#"{"sysData": 0}"#);
        assert_eq!(bp.sys, Field::Present(0.0));
        assert_eq!(bp.dia, Field::Missing);
        assert_eq!(bp.dia.or_zero(), 0.0);
        assert_eq!(bp.arrhythmia.or_zero(), 0);
    }

    #[test]
    fn malformed_payload_is_scanned() {
        // Truncated JSON from older gateways
        let bp = parse_bp(r#"{"sysData":145,"diaData":85,"pulseData":"72""#);
        assert_eq!(bp.sys, Field::Present(145.0));
        assert_eq!(bp.dia, Field::Present(85.0));
        assert_eq!(bp.hr, Field::Present(72.0));
    }

    #[test]
    fn garbage_yields_missing_fields() {
        let spo2 = parse_spo2("not a payload");
        assert_eq!(spo2.spo2, Field::Missing);
        assert_eq!(spo2.pulse, Field::Missing);
    }

    #[test]
    fn nested_fields_are_found_shallow_first() {
        let fields = PayloadFields::parse(r#"{"data": {"spo2": 91, "pr": 80}, "pr": 77}"#);
        assert_eq!(fields.number("spo2"), Field::Present(91.0));
        assert_eq!(fields.number("pr"), Field::Present(77.0));
    }

    #[test]
    fn numbers_with_units() {
        let fields = PayloadFields::parse(r#"{"weight": "182.4 lbs", "bmi": "n/a"}"#);
        assert_eq!(fields.number("weight"), Field::Present(182.4));
        assert_eq!(fields.number("bmi"), Field::Missing);
    }

    #[test]
    fn glucose_type_from_payload_then_hint() {
        let g = parse_glucose(r#"{"bloodGlucose": "140", "type": "Fasting"}"#, Some("Random"));
        assert_eq!(g.reading_type, Field::Present("fasting".to_string()));
        assert_eq!(g.kind(), GlucoseKind::Fasting);

        let g = parse_glucose(r#"{"bloodGlucose": 190}"#, Some("After Meal"));
        assert_eq!(g.kind(), GlucoseKind::PostMeal);
        assert_eq!(g.value, Field::Present(190.0));
    }

    #[test]
    fn glucose_without_type_is_random() {
        let g = parse_glucose(r#"{"bloodGlucose": 250}"#, None);
        assert_eq!(g.reading_type, Field::Missing);
        assert_eq!(g.kind(), GlucoseKind::Random);

        let g = parse_glucose(r#"{"bloodGlucose": 250}"#, Some("  "));
        assert_eq!(g.kind(), GlucoseKind::Random);
    }

    #[test]
    fn glucose_kind_substrings() {
        assert_eq!(GlucoseKind::from_type(Some("pre-breakfast fasting")), GlucoseKind::Fasting);
        assert_eq!(GlucoseKind::from_type(Some("POSTPRANDIAL")), GlucoseKind::PostMeal);
        assert_eq!(GlucoseKind::from_type(Some("before meal")), GlucoseKind::PostMeal);
        assert_eq!(GlucoseKind::from_type(Some("bedtime")), GlucoseKind::Random);
    }

    #[test]
    fn evidence_json_uses_integers_when_whole() {
        let bp = parse_bp(r#"{"sysData":150,"diaData":85,"pulseData":70,"arrhythmia":0}"#);
        assert_eq!(
            bp.to_json(),
            json!({"sys": 150, "dia": 85, "hr": 70, "arrhythmia": 0})
        );

        let w = parse_weight(r#"{"weight": 81.5}"#);
        assert_eq!(w.to_json(), json!({"weight": 81.5, "height": null, "bmi": null}));
    }
}
