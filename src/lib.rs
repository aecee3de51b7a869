//! # forcebridge-rs: hierarchical tables to external force files
//!
//! Simulation post-processors write wide tables where every row is one time
//! series and the series' place in a variable taxonomy is encoded by the
//! overlap between a short name and a fully qualified name. This crate
//! rebuilds that taxonomy as a tree, caches it, finds variables by name,
//! optionally rewrites them with a small script, and writes each one as a
//! fixed-format force file for an external simulation tool.
//!
//! ## Architecture
//!
//! - **Parser**: CSV/TSV/spreadsheet rows to token paths and leaf records
//! - **Tree**: last-write-wins assembly and pre-order name resolution
//! - **Cache**: per-file and aggregate `bincode` caches with a fixed reuse policy
//! - **Scripting**: Rhai transformations over one bound series, `Var`
//! - **Writer**: the six-column force file format
//! - **Pipeline**: one configured run, returning a [`RunSummary`]
//!
//! ## Example
//!
//! ```ignore
//! use forcebridge_rs::{Pipeline, RunConfig, RunOptions};
//!
//! fn main() -> forcebridge_rs::Result<()> {
//!     let config = RunConfig::load("run.json")?;
//!     let summary = Pipeline::new(config, RunOptions::default()).run()?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod scripting;
pub mod tree;
pub mod types;
pub mod writer;

// Re-export commonly used types
pub use cache::{AggregateCache, CacheOutcome, CacheStore};
pub use config::{RunConfig, VarSpec};
pub use diagnostics::{DiagnosticSink, LogSink};
pub use error::{ForceBridgeError, Result};
pub use parser::{parse_source, LabelParser, ParseOptions};
pub use pipeline::{Pipeline, RunOptions, RunSummary};
pub use scripting::{TransformEngine, TransformOutcome};
pub use types::{Branch, LeafRecord, SourceFileResult, VariableNode};
