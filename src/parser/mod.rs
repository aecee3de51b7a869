//! Hierarchical label parser
//!
//! Each source row describes one series. Its position in the variable
//! taxonomy is encoded by the overlap between the short name column and the
//! fully qualified name column:
//!
//! ```text
//! short name   qualified name          token path
//! Fx           Tower.Base.Fx           [Tower, Base, Fx]
//! Fx           Fx                      [Fx]
//! My           Blade 1.Root.My         [Blade_1, Root, My]
//! ```
//!
//! Descriptor columns after the names carry `key=value` pairs
//! (`xunit=`, `yunit=`, `ten=`, `dx=`, `x0=`). Everything after the fixed
//! descriptor block is sample data.

pub mod sanitize;
pub mod table;

pub use sanitize::{sanitize_identifier, source_key};
pub use table::{read_table, Cell, DataLines, TableFormat, TableRow};

use crate::error::{ForceBridgeError, Result};
use crate::tree::TreeAssembler;
use crate::types::{check_declared_count, declared_count, LeafRecord, SourceFileResult};
use std::path::Path;

/// Default number of leading descriptor columns
pub const DEFAULT_FIXED_COL_COUNT: usize = 8;

/// Descriptor column positions (0-based)
pub mod columns {
    pub const SHORT_NAME: usize = 0;
    pub const QUALIFIED_NAME: usize = 2;
    pub const XUNIT: usize = 3;
    pub const YUNIT: usize = 4;
    pub const TEN: usize = 5;
    pub const DX: usize = 6;
    pub const X0: usize = 7;
}

/// Result of decoding one row.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    /// Sanitized ancestor tokens followed by the leaf token
    pub path: Vec<String>,
    pub leaf: LeafRecord,
    /// Cells inside the window that could not be read as numbers
    pub recovered_cells: usize,
}

/// Options for turning a table into a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub fixed_col_count: usize,
    pub data_lines: DataLines,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            fixed_col_count: DEFAULT_FIXED_COL_COUNT,
            data_lines: DataLines::default(),
        }
    }
}

/// Decodes rows into token paths and leaf records.
#[derive(Debug, Clone, Copy)]
pub struct LabelParser {
    fixed_col_count: usize,
}

impl Default for LabelParser {
    fn default() -> Self {
        Self::new(DEFAULT_FIXED_COL_COUNT)
    }
}

impl LabelParser {
    pub fn new(fixed_col_count: usize) -> Self {
        Self { fixed_col_count }
    }

    pub fn fixed_col_count(&self) -> usize {
        self.fixed_col_count
    }

    /// Decode one row. Returns `None` when the short name cell is blank.
    pub fn parse_row(&self, cells: &[Cell]) -> Option<ParsedRow> {
        let text = |idx: usize| cells.get(idx).map(|c| c.as_text()).unwrap_or_default();

        let short_name = text(columns::SHORT_NAME);
        if short_name.is_empty() {
            return None;
        }
        let qualified_name = text(columns::QUALIFIED_NAME);
        let path = token_path(&short_name, &qualified_name);

        let xunit = strip_key(&text(columns::XUNIT), "xunit=").to_string();
        let yunit = strip_key(&text(columns::YUNIT), "yunit=").to_string();
        let ten = descriptor_number(&text(columns::TEN), "ten=");
        let dx = descriptor_number(&text(columns::DX), "dx=");
        let x0 = descriptor_number(&text(columns::X0), "x0=");

        if ten.is_nan() || dx.is_nan() || x0.is_nan() {
            tracing::debug!(
                "Row '{}' has unparsable descriptors (ten={}, dx={}, x0={})",
                short_name,
                ten,
                dx,
                x0
            );
        }
        if let Err(e) = check_declared_count(ten) {
            tracing::warn!("Row '{}': {}; using the available cells", short_name, e);
        }

        let (values, recovered_cells) = self.sample_values(cells, ten);
        Some(ParsedRow {
            path,
            leaf: LeafRecord::new(xunit, yunit, ten, dx, x0, values),
            recovered_cells,
        })
    }

    /// Sample window coerced to floats and reconciled to the declared length.
    ///
    /// Returns the values and the number of cells that had to be recovered
    /// as NaN. With a valid `ten` the output is exactly `ten` long; otherwise
    /// every cell after the descriptor block is used as is.
    pub fn sample_values(&self, cells: &[Cell], ten: f64) -> (Vec<f64>, usize) {
        let start = self.fixed_col_count.min(cells.len());
        let available = &cells[start..];

        let window = match declared_count(ten) {
            Some(count) => &available[..count.min(available.len())],
            None => available,
        };

        let mut recovered = 0;
        let mut values: Vec<f64> = window
            .iter()
            .map(|cell| {
                let v = cell.to_f64();
                if v.is_nan() && !matches!(cell, Cell::Number(_)) {
                    recovered += 1;
                }
                v
            })
            .collect();

        if let Some(count) = declared_count(ten) {
            values.resize(count, f64::NAN);
        }

        (values, recovered)
    }
}

/// Token path implied by a short name and its fully qualified name.
pub fn token_path(short_name: &str, qualified_name: &str) -> Vec<String> {
    let ancestors = ancestor_string(short_name, qualified_name)
        .trim_end_matches(|c: char| !c.is_alphanumeric());

    let mut path: Vec<String> = ancestors
        .split('.')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(sanitize_identifier)
        .collect();
    path.push(sanitize_identifier(short_name));
    path
}

/// Qualified name with the trailing `len(short_name)` characters removed.
///
/// Empty unless the qualified name is strictly longer than the short name.
pub fn ancestor_string<'a>(short_name: &str, qualified_name: &'a str) -> &'a str {
    let short_len = short_name.chars().count();
    let qualified_len = qualified_name.chars().count();
    if qualified_len <= short_len {
        return "";
    }

    let cut = qualified_name
        .char_indices()
        .nth(qualified_len - short_len)
        .map(|(i, _)| i)
        .unwrap_or(qualified_name.len());

    let suffix = &qualified_name[cut..];
    if suffix != short_name {
        tracing::debug!(
            "Qualified name '{}' does not end with short name '{}'",
            qualified_name,
            short_name
        );
    }
    &qualified_name[..cut]
}

fn strip_key<'a>(text: &'a str, key: &str) -> &'a str {
    let text = text.trim();
    text.strip_prefix(key).map(str::trim).unwrap_or(text)
}

fn descriptor_number(text: &str, key: &str) -> f64 {
    table::parse_number(strip_key(text, key))
}

/// Read a source table and assemble its variable tree.
pub fn parse_source(path: &Path, options: &ParseOptions) -> Result<SourceFileResult> {
    let rows = read_table(path, options.data_lines)?;
    let parser = LabelParser::new(options.fixed_col_count);
    let mut assembler = TreeAssembler::new();
    let mut rows_skipped = 0;
    let mut recovered_cells = 0;

    for row in &rows {
        let Some(parsed) = parser.parse_row(&row.cells) else {
            tracing::debug!("Skipping row {} of {:?}: blank short name", row.line, path);
            rows_skipped += 1;
            continue;
        };
        recovered_cells += parsed.recovered_cells;

        if let Err(e) = assembler.insert(&parsed.path, parsed.leaf) {
            tracing::warn!("Skipping row {} of {:?}: {}", row.line, path, e);
            rows_skipped += 1;
        }
    }

    if recovered_cells > 0 {
        tracing::warn!("{}", recovered_cells_error(path, recovered_cells));
    }

    let rows_parsed = assembler.inserted();
    tracing::info!(
        "Parsed {:?}: {} rows, {} leaves, {} overwritten, {} skipped",
        path,
        rows_parsed,
        assembler.leaf_count(),
        assembler.overwritten(),
        rows_skipped
    );

    Ok(SourceFileResult {
        root: assembler.finish(),
        rows_parsed,
        rows_skipped,
    })
}

/// Parse error reported once per file for sample cells read back as NaN.
fn recovered_cells_error(path: &Path, count: usize) -> ForceBridgeError {
    ForceBridgeError::Parse(format!(
        "{:?}: {} non-numeric sample cells recovered as NaN",
        path, count
    ))
}
