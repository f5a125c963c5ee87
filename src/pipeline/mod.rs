pub mod clinical_metrics;
