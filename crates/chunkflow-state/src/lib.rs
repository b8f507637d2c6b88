//! Durable execution store for the chunkflow batch engine.
//!
//! [`ExecutionStore`] defines the storage contract for job instances,
//! job/step executions, and their restart state. The SQLite
//! implementation is the default backend; model types live in
//! `chunkflow-types`.

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::ExecutionStore;
pub use error::{Result, StoreError};
pub use sqlite::SqliteExecutionStore;
