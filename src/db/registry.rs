//! Practice registry: the set of practice databases a run covers.
//!
//! Built once at process start from configuration and passed by reference
//! to the pipeline. Connections are never cached; `open_db` hands out a
//! fresh connection scoped to the caller's operation.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use super::sqlite::open_database;
use super::DatabaseError;
use crate::config::EtlConfig;

/// A registered practice and the SQLite file holding its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeHandle {
    pub practice_id: String,
    pub practice_name: String,
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct PracticeRegistry {
    practices: Vec<PracticeHandle>,
}

impl PracticeRegistry {
    pub fn new(practices: Vec<PracticeHandle>) -> Self {
        Self { practices }
    }

    pub fn from_config(config: &EtlConfig) -> Self {
        let practices = config
            .practices
            .iter()
            .map(|p| PracticeHandle {
                practice_id: p.practice_id.clone(),
                practice_name: if p.practice_name.is_empty() {
                    p.practice_id.clone()
                } else {
                    p.practice_name.clone()
                },
                database_path: p.resolved_database_path(),
            })
            .collect();
        Self { practices }
    }

    /// Practices in processing order.
    pub fn practices(&self) -> &[PracticeHandle] {
        &self.practices
    }

    pub fn get(&self, practice_id: &str) -> Option<&PracticeHandle> {
        self.practices.iter().find(|p| p.practice_id == practice_id)
    }

    pub fn database_path(&self, practice_id: &str) -> Result<&Path, DatabaseError> {
        self.get(practice_id)
            .map(|p| p.database_path.as_path())
            .ok_or_else(|| DatabaseError::NotFound {
                entity_type: "practice".into(),
                id: practice_id.to_string(),
            })
    }

    /// Open a connection to a practice database. The caller owns it and
    /// should drop it as soon as its operation completes.
    pub fn open_db(&self, practice_id: &str) -> Result<Connection, DatabaseError> {
        open_database(self.database_path(practice_id)?)
    }

    /// Ids of practices whose database file does not exist yet.
    pub fn missing_databases(&self) -> Vec<&str> {
        self.practices
            .iter()
            .filter(|p| !p.database_path.exists())
            .map(|p| p.practice_id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.practices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.practices.is_empty()
    }
}
