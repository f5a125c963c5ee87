//! Error types for the clinical metrics ETL.

use thiserror::Error;

use crate::config::ConfigError;
use crate::db::DatabaseError;
use crate::models::EnrollmentPeriod;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Cohort lookup failed for practice {practice_id}, period {period}: {reason}")]
    Cohort {
        practice_id: String,
        period: EnrollmentPeriod,
        reason: String,
    },

    #[error("Practice not registered: {0}")]
    UnknownPractice(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Another metrics run is already in progress")]
    RunInProgress,
}
