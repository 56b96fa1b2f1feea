#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Document storage for terrain and reference data.
//!
//! Everything the pipeline persists is a JSON document in a named
//! collection behind the [`DocumentStore`] trait. [`MemoryStore`] backs
//! tests and throwaway runs; [`DuckDbStore`] keeps documents in a local
//! `DuckDB` file. [`TerrainRepository`] wraps the store with the partial
//! updates the layer ETLs need.

pub mod duck;
pub mod filter;
pub mod memory;
pub mod paths;
pub mod store;
pub mod terrain;

pub use duck::DuckDbStore;
pub use filter::{Filter, Update};
pub use memory::MemoryStore;
pub use store::{DocumentStore, UpdateOutcome, collections};
pub use terrain::TerrainRepository;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` query error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
