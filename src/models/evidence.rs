use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::MetricBucket;

/// One reading that contributed to a bucket, kept for drill-down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub patient_id: String,
    /// Parsed fields of the reading (e.g. `{"sys":150,"dia":85,...}`).
    pub value: serde_json::Value,
    pub reading_timestamp: Option<NaiveDateTime>,
}

impl EvidenceRecord {
    pub fn new(
        patient_id: impl Into<String>,
        value: serde_json::Value,
        reading_timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            value,
            reading_timestamp: Some(reading_timestamp),
        }
    }
}

/// Evidence grouped by bucket. Ordered so that persisted rows come out
/// in the same order on every run over the same input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceMap {
    buckets: BTreeMap<MetricBucket, Vec<EvidenceRecord>>,
}

impl EvidenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bucket: MetricBucket, record: EvidenceRecord) {
        self.buckets.entry(bucket).or_default().push(record);
    }

    pub fn records(&self, bucket: MetricBucket) -> &[EvidenceRecord] {
        self.buckets.get(&bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, bucket: MetricBucket) -> u32 {
        self.records(bucket).len() as u32
    }

    /// Number of distinct patients with at least one record in `bucket`.
    pub fn distinct_patients(&self, bucket: MetricBucket) -> u32 {
        self.records(bucket)
            .iter()
            .map(|r| r.patient_id.as_str())
            .collect::<BTreeSet<_>>()
            .len() as u32
    }

    /// Move every record of `other` into `self`.
    pub fn merge(&mut self, other: EvidenceMap) {
        for (bucket, mut records) in other.buckets {
            self.buckets.entry(bucket).or_default().append(&mut records);
        }
    }

    pub fn total_rows(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }

    /// Flatten into `(bucket, record)` pairs in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = (MetricBucket, &EvidenceRecord)> {
        self.buckets
            .iter()
            .flat_map(|(bucket, records)| records.iter().map(move |r| (*bucket, r)))
    }
}
