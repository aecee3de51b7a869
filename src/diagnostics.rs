//! Receivers for original-vs-transformed comparisons.
//!
//! Every transformed variable is handed to a [`DiagnosticSink`] together with
//! its original series. The shipped sinks log a summary or write the pairs to
//! a CSV file for plotting elsewhere.

use crate::error::{ForceBridgeError, Result};
use crate::types::SeriesStats;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Receives one comparison per transformed variable.
#[cfg_attr(test, mockall::automock)]
pub trait DiagnosticSink {
    fn compare(&mut self, label: &str, original: &[f64], transformed: &[f64]);
}

/// Logs min/max difference and mean shift through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn compare(&mut self, label: &str, original: &[f64], transformed: &[f64]) {
        let diffs: Vec<f64> = original
            .iter()
            .zip(transformed)
            .map(|(a, b)| b - a)
            .collect();
        let diff = SeriesStats::from_values(&diffs);
        let before = SeriesStats::from_values(original);
        let after = SeriesStats::from_values(transformed);

        tracing::info!(
            "{}: {} samples, diff in [{:.6}, {:.6}], mean {:.6} -> {:.6}",
            label,
            transformed.len(),
            diff.min(),
            diff.max(),
            before.mean(),
            after.mean()
        );
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn compare(&mut self, _label: &str, _original: &[f64], _transformed: &[f64]) {}
}

/// Writes `label,index,original,transformed` rows to one CSV file.
///
/// Labels are quoted as needed by the `csv` writer.
#[derive(Debug)]
pub struct CsvSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows_written: u64,
}

impl CsvSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| {
            ForceBridgeError::OutputWrite(format!("Failed to create {:?}: {}", path, e))
        })?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(["label", "index", "original", "transformed"])
            .map_err(|e| ForceBridgeError::OutputWrite(format!("{:?}: {}", path, e)))?;
        Ok(Self {
            writer,
            path,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl DiagnosticSink for CsvSink {
    fn compare(&mut self, label: &str, original: &[f64], transformed: &[f64]) {
        for (i, (a, b)) in original.iter().zip(transformed).enumerate() {
            let record = [
                label.to_string(),
                i.to_string(),
                format!("{:.10}", a),
                format!("{:.10}", b),
            ];
            if let Err(e) = self.writer.write_record(&record) {
                tracing::warn!("Diagnostic CSV {:?}: write failed: {}", self.path, e);
                return;
            }
            self.rows_written += 1;
        }
    }
}
