//! External force file writer
//!
//! The consuming simulation tool reads a whitespace-separated table with six
//! columns per time step. Only the fifth column carries the series; the
//! others are written as `0`.
//!
//! ```text
//! # forcebridge-rs 0.1.0 (2026-01-01T00:00:00+00:00)
//! # Variable: Fx
//! 6
//! 2
//! 0.100000
//! 0 0 0 0 1.500000 0
//! 0 0 0 0 -2.000000 0
//! ```

use crate::error::{ForceBridgeError, Result};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Columns per data line
pub const FORCE_FILE_COLUMNS: usize = 6;

/// Zero-based column holding the sample value
pub const VALUE_COLUMN: usize = 4;

/// Marker that starts a header line
pub const COMMENT_MARKER: char = '#';

/// Header lines written above the parameter block.
#[derive(Debug, Clone, PartialEq)]
pub struct ForceFileHeader {
    pub variable: String,
    pub generated_at: Option<DateTime<Utc>>,
}

impl ForceFileHeader {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            generated_at: None,
        }
    }

    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    fn generator_tag(&self) -> String {
        let tag = format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        match self.generated_at {
            Some(at) => format!("{} ({})", tag, at.to_rfc3339()),
            None => tag,
        }
    }
}

/// One data line: the value in [`VALUE_COLUMN`], zeros elsewhere.
pub fn format_data_line(value: f64) -> String {
    let mut columns = vec!["0".to_string(); FORCE_FILE_COLUMNS];
    columns[VALUE_COLUMN] = format!("{:.6}", value);
    columns.join(" ")
}

/// Serialize one series into the force file format.
pub fn write_force_file<W: Write>(
    out: &mut W,
    header: &ForceFileHeader,
    dx: f64,
    values: &[f64],
) -> std::io::Result<()> {
    writeln!(out, "{} {}", COMMENT_MARKER, header.generator_tag())?;
    writeln!(out, "{} Variable: {}", COMMENT_MARKER, header.variable)?;

    writeln!(out, "{}", FORCE_FILE_COLUMNS)?;
    writeln!(out, "{}", values.len())?;
    writeln!(out, "{:.6}", dx)?;

    for &value in values {
        writeln!(out, "{}", format_data_line(value))?;
    }
    Ok(())
}

/// Create (or truncate) `path` and write the force file into it.
pub fn write_force_file_to_path(
    path: &Path,
    header: &ForceFileHeader,
    dx: f64,
    values: &[f64],
) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        ForceBridgeError::OutputWrite(format!("Failed to create {:?}: {}", path, e))
    })?;
    let mut writer = BufWriter::new(file);
    write_force_file(&mut writer, header, dx, values)
        .and_then(|_| writer.flush())
        .map_err(|e| ForceBridgeError::OutputWrite(format!("Failed to write {:?}: {}", path, e)))?;

    tracing::debug!("Wrote {} samples to {:?}", values.len(), path);
    Ok(())
}
