//! Repository layer: table-scoped database operations.
//!
//! Telemetry and enrollment tables are read-only here; the metric tables
//! are owned by this crate.

mod enrollment;
mod evidence;
mod summary;
mod telemetry;

pub use enrollment::*;
pub use evidence::*;
pub use summary::*;
pub use telemetry::*;
