//! One configured run, from source tables to force files.
//!
//! # Flow
//!
//! ```text
//! input files ──► CacheStore::ensure ──► aggregate (in memory)
//!                      │ miss
//!                      └──► read_table ─► LabelParser ─► TreeAssembler
//!
//! var_to_process ──► resolve ──► [transform ─► DiagnosticSink] ──► force file
//!
//! end of run ──► CacheStore::persist
//! ```
//!
//! Only configuration problems and unreadable sources stop a run. Everything
//! else is logged, counted in the [`RunSummary`], and the run moves on.

use crate::cache::{AggregateCache, CacheOutcome, CacheStore};
use crate::config::{RunConfig, VarSpec};
use crate::diagnostics::{DiagnosticSink, LogSink};
use crate::error::{ForceBridgeError, Result};
use crate::parser::{parse_source, sanitize_identifier};
use crate::scripting::TransformEngine;
use crate::writer::{write_force_file_to_path, ForceFileHeader};
use std::fmt;
use std::path::PathBuf;

/// Switches that change what a run touches on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Resolve and transform, but write neither force files nor caches
    pub dry_run: bool,
    /// Stamp the generation time into force file headers
    pub timestamp: bool,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sources: usize,
    pub aggregate_hits: usize,
    pub per_file_hits: usize,
    pub reparsed: usize,
    /// Variables resolved (and transformed) successfully
    pub variables_processed: usize,
    pub variables_skipped: usize,
    /// Non-fatal problems, one per warning logged
    pub warnings: usize,
    /// Force files written, in processing order
    pub outputs: Vec<PathBuf>,
}

impl RunSummary {
    fn record(&mut self, outcome: CacheOutcome) {
        self.sources += 1;
        match outcome {
            CacheOutcome::AggregateHit => self.aggregate_hits += 1,
            CacheOutcome::PerFileHit => self.per_file_hits += 1,
            CacheOutcome::Parsed => self.reparsed += 1,
        }
    }

    pub fn variables_written(&self) -> usize {
        self.outputs.len()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Sources:   {} ({} aggregate hit, {} per-file hit, {} parsed)",
            self.sources, self.aggregate_hits, self.per_file_hits, self.reparsed
        )?;
        writeln!(
            f,
            "Variables: {} processed, {} written, {} skipped",
            self.variables_processed,
            self.variables_written(),
            self.variables_skipped
        )?;
        write!(f, "Warnings:  {}", self.warnings)
    }
}

/// Drives one run of a [`RunConfig`].
pub struct Pipeline<S: DiagnosticSink = LogSink> {
    config: RunConfig,
    options: RunOptions,
    engine: TransformEngine,
    sink: S,
}

impl Pipeline<LogSink> {
    pub fn new(config: RunConfig, options: RunOptions) -> Self {
        Self::with_sink(config, options, LogSink)
    }
}

impl<S: DiagnosticSink> Pipeline<S> {
    pub fn with_sink(config: RunConfig, options: RunOptions, sink: S) -> Self {
        Self {
            config,
            options,
            engine: TransformEngine::new(),
            sink,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Execute the run.
    ///
    /// Returns `Err` only for fatal problems; see [`ForceBridgeError::is_fatal`].
    pub fn run(&mut self) -> Result<RunSummary> {
        self.config.validate()?;

        let run_dir = self.config.run_dir();
        let mut summary = RunSummary::default();
        let mut store = CacheStore::open(self.config.cache_dir(), self.config.aggregate_key())?;
        store.set_read_only(self.options.dry_run);

        let parse_options = self.config.parse_options();
        for source in self.config.inputs() {
            match store.ensure(source, |path| parse_source(path, &parse_options)) {
                Ok(outcome) => summary.record(outcome),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping source {:?}: {}", source, e);
                    summary.warnings += 1;
                }
            }
        }

        let requests: Vec<(String, VarSpec)> = self
            .config
            .var_to_process
            .iter()
            .map(|(name, spec)| (name.clone(), spec.clone()))
            .collect();

        for (name, spec) in &requests {
            match self.process_variable(store.aggregate(), &run_dir, name, spec) {
                Ok(written) => {
                    summary.variables_processed += 1;
                    summary.outputs.extend(written);
                }
                Err(e) => {
                    tracing::warn!("Skipping variable '{}': {}", name, e);
                    summary.variables_skipped += 1;
                    summary.warnings += 1;
                }
            }
        }

        if let Err(e) = store.persist() {
            tracing::warn!("Aggregate cache not saved: {}", e);
            summary.warnings += 1;
        }
        summary.warnings += store.warnings();

        tracing::info!(
            "Run '{}' finished: {} written, {} skipped, {} warning(s)",
            self.config.config_name,
            summary.variables_written(),
            summary.variables_skipped,
            summary.warnings
        );
        Ok(summary)
    }

    /// Resolve, optionally transform, and write one variable.
    ///
    /// Returns the written path, or `None` on a dry run.
    pub fn process_variable(
        &mut self,
        aggregate: &AggregateCache,
        run_dir: &std::path::Path,
        name: &str,
        spec: &VarSpec,
    ) -> Result<Option<PathBuf>> {
        let file_name = spec.output_file_name().ok_or_else(|| {
            ForceBridgeError::OutputWrite(format!("no outputFileName given for '{}'", name))
        })?;

        let key = sanitize_identifier(name);
        let found = aggregate
            .resolve(&key)
            .ok_or_else(|| ForceBridgeError::VariableNotFound(name.to_string()))?;
        tracing::info!("'{}' resolved to {}", name, found.dotted());

        let leaf = found.leaf;
        let values = match spec.transformation() {
            Some(script) => {
                let outcome = self.engine.transform(name, script, leaf.values())?;
                self.sink
                    .compare(name, &outcome.original, &outcome.transformed);
                outcome.transformed
            }
            None => leaf.values().to_vec(),
        };

        if self.options.dry_run {
            tracing::info!("Dry run: '{}' not written ({} samples)", name, values.len());
            return Ok(None);
        }

        std::fs::create_dir_all(run_dir).map_err(|e| {
            ForceBridgeError::OutputWrite(format!("Failed to create {:?}: {}", run_dir, e))
        })?;

        let mut header = ForceFileHeader::new(name);
        if self.options.timestamp {
            header = header.with_timestamp(chrono::Utc::now());
        }
        let path = run_dir.join(file_name);
        write_force_file_to_path(&path, &header, leaf.dx(), &values)?;
        tracing::info!("Wrote '{}' to {:?}", name, path);
        Ok(Some(path))
    }
}
