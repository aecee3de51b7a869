//! Table readers for wide source files.
//!
//! Delimited text goes through the `csv` crate, spreadsheets through
//! `calamine`. Both produce [`TableRow`]s of typed [`Cell`]s with 1-based
//! line numbers, filtered to the configured [`DataLines`] window.

use crate::error::{ForceBridgeError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;

/// One cell of a source table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Natively numeric (spreadsheet) cell
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    /// Build a cell from delimited text; blank text is [`Cell::Empty`].
    pub fn from_text(text: &str) -> Self {
        if text.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(text.to_string())
        }
    }

    /// Textual form of the cell, trimmed.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Cell::Number(v) => Cow::Owned(v.to_string()),
            Cell::Text(s) => Cow::Borrowed(s.trim()),
            Cell::Empty => Cow::Borrowed(""),
        }
    }

    /// Numeric value: numbers pass through, text is parsed, anything else is NaN.
    pub fn to_f64(&self) -> f64 {
        match self {
            Cell::Number(v) => *v,
            Cell::Text(s) => parse_number(s),
            Cell::Empty => f64::NAN,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }
}

/// Parse trimmed text as a float, NaN on failure.
pub fn parse_number(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// A row read from a source table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// 1-based line (row) number in the source
    pub line: usize,
    pub cells: Vec<Cell>,
}

/// Inclusive 1-based row window; `end = None` is unbounded.
///
/// Serialized as a two element array, e.g. `[2, null]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(usize, Option<usize>)", into = "(usize, Option<usize>)")]
pub struct DataLines {
    pub start: usize,
    pub end: Option<usize>,
}

impl DataLines {
    pub fn new(start: usize, end: Option<usize>) -> Self {
        Self { start, end }
    }

    /// All rows.
    pub fn all() -> Self {
        Self::new(1, None)
    }

    pub fn contains(&self, line: usize) -> bool {
        line >= self.start && self.end.is_none_or(|end| line <= end)
    }

    /// True once `line` is past the window.
    pub fn is_past(&self, line: usize) -> bool {
        self.end.is_some_and(|end| line > end)
    }
}

impl Default for DataLines {
    /// Skip the header row.
    fn default() -> Self {
        Self::new(2, None)
    }
}

impl From<(usize, Option<usize>)> for DataLines {
    fn from((start, end): (usize, Option<usize>)) -> Self {
        Self { start, end }
    }
}

impl From<DataLines> for (usize, Option<usize>) {
    fn from(lines: DataLines) -> Self {
        (lines.start, lines.end)
    }
}

/// Source table format, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Tsv,
    Spreadsheet,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "tsv" | "tab" | "txt" => TableFormat::Tsv,
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => TableFormat::Spreadsheet,
            _ => TableFormat::Csv,
        }
    }
}

/// Read every row of `path` inside `lines`.
pub fn read_table(path: &Path, lines: DataLines) -> Result<Vec<TableRow>> {
    match TableFormat::from_path(path) {
        TableFormat::Csv => read_delimited(path, b',', lines),
        TableFormat::Tsv => read_delimited(path, b'\t', lines),
        TableFormat::Spreadsheet => read_spreadsheet(path, lines),
    }
}

fn source_error(path: &Path, message: impl Into<String>) -> ForceBridgeError {
    ForceBridgeError::SourceRead {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn read_delimited(path: &Path, delimiter: u8, lines: DataLines) -> Result<Vec<TableRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| source_error(path, e.to_string()))?;

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 1;
        if lines.is_past(line) {
            break;
        }
        if !lines.contains(line) {
            continue;
        }
        match result {
            Ok(record) => rows.push(TableRow {
                line,
                cells: record.iter().map(Cell::from_text).collect(),
            }),
            Err(e) if e.is_io_error() => return Err(source_error(path, e.to_string())),
            Err(e) => {
                tracing::warn!("Skipping unreadable row {} in {:?}: {}", line, path, e);
            }
        }
    }

    Ok(rows)
}

fn read_spreadsheet(path: &Path, lines: DataLines) -> Result<Vec<TableRow>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| source_error(path, e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| source_error(path, "Workbook contains no sheets"))?
        .map_err(|e| source_error(path, e.to_string()))?;

    // Ranges start at the first used cell, not at A1.
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows = Vec::new();
    for (idx, row) in range.rows().enumerate() {
        let line = row_offset + idx + 1;
        if lines.is_past(line) {
            break;
        }
        if !lines.contains(line) {
            continue;
        }

        let mut cells = vec![Cell::Empty; col_offset];
        cells.extend(row.iter().map(|cell| match cell {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::from_text(s),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
            Data::Error(e) => Cell::Text(format!("{:?}", e)),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) => Cell::Text(s.clone()),
            Data::DurationIso(s) => Cell::Text(s.clone()),
        }));
        rows.push(TableRow { line, cells });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(ext: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(ext)
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_cell_coercion() {
        assert_eq!(Cell::Number(2.5).to_f64(), 2.5);
        assert_eq!(Cell::Text(" 4.0 ".into()).to_f64(), 4.0);
        assert!(Cell::Text("abc".into()).to_f64().is_nan());
        assert!(Cell::Empty.to_f64().is_nan());
        assert_eq!(Cell::from_text("   "), Cell::Empty);
    }

    #[test]
    fn test_data_lines_window() {
        let lines = DataLines::new(2, Some(4));
        assert!(!lines.contains(1));
        assert!(lines.contains(2));
        assert!(lines.contains(4));
        assert!(!lines.contains(5));
        assert!(lines.is_past(5));

        let open = DataLines::default();
        assert!(open.contains(10_000));
        assert!(!open.is_past(10_000));
    }

    #[test]
    fn test_data_lines_serde() {
        let lines: DataLines = serde_json::from_str("[3, null]").unwrap();
        assert_eq!(lines, DataLines::new(3, None));
        let lines: DataLines = serde_json::from_str("[1, 9]").unwrap();
        assert_eq!(lines, DataLines::new(1, Some(9)));
        assert_eq!(serde_json::to_string(&lines).unwrap(), "[1,9]");
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(TableFormat::from_path(Path::new("a.csv")), TableFormat::Csv);
        assert_eq!(TableFormat::from_path(Path::new("a.TSV")), TableFormat::Tsv);
        assert_eq!(
            TableFormat::from_path(Path::new("a.xlsx")),
            TableFormat::Spreadsheet
        );
        assert_eq!(TableFormat::from_path(Path::new("a")), TableFormat::Csv);
    }

    #[test]
    fn test_read_csv_ragged_rows() {
        let file = write_temp(".csv", "h1,h2,h3\na,b\nc,d,e,f\n");
        let rows = read_table(file.path(), DataLines::default()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].cells.len(), 2);
        assert_eq!(rows[1].cells.len(), 4);
        assert_eq!(rows[1].cells[3], Cell::Text("f".into()));
    }

    #[test]
    fn test_read_tsv_with_end_line() {
        let file = write_temp(".tsv", "a\t1\nb\t2\nc\t3\n");
        let rows = read_table(file.path(), DataLines::new(1, Some(2))).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].cells[0], Cell::Text("b".into()));
    }

    #[test]
    fn test_missing_file_is_source_error() {
        let err = read_table(Path::new("/nonexistent/table.csv"), DataLines::all()).unwrap_err();
        assert!(err.is_fatal());
    }
}
