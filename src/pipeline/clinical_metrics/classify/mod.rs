//! Classifiers: readings in, aggregate statistics plus per-bucket evidence out.
//!
//! Every classifier is a pure function over already-fetched readings, so
//! it can be exercised without a database.

pub mod alert;
pub mod bp;
pub mod glucose;
pub mod spo2;
pub mod weight;

use std::collections::BTreeSet;

use crate::models::{DeviceReading, EvidenceMap};

pub use alert::classify_alerts;
pub use bp::classify_bp;
pub use glucose::classify_glucose;
pub use spo2::classify_spo2;
pub use weight::classify_weight;

/// Output of one classifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifierOutput<M> {
    pub aggregate: M,
    pub evidence: EvidenceMap,
}

/// Number of distinct patients among `readings`.
pub(crate) fn distinct_patients(readings: &[DeviceReading]) -> u32 {
    readings
        .iter()
        .map(|r| r.patient_id.as_str())
        .collect::<BTreeSet<_>>()
        .len() as u32
}
