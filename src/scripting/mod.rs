//! Rhai-based series transformations
//!
//! A transformation is a short script over one bound variable, `Var`, which
//! holds the whole series. Scripts run in an embedded Rhai engine with safety
//! limits; nothing outside the bound variable is reachable.
//!
//! ## Operators
//!
//! `+ - * / **` work elementwise between two series of equal length and
//! between a series and a number. Unary minus negates every sample.
//! `Var[i]` reads (and assigns) one sample; negative indices count from the end.
//!
//! ## Functions
//!
//! - Aggregates: `mean`, `sum`, `min`, `max`, `std`, `rms`, `len`, `first`,
//!   `last`. NaN samples are skipped; an all-NaN series gives NaN.
//! - Elementwise: `abs`, `sqrt`, `exp`, `ln`, `sin`, `cos`,
//!   `clamp(series, lo, hi)`
//!
//! ## Result
//!
//! The script's final value is used when it is a series or a number;
//! otherwise the final value of `Var`. Numbers are broadcast to the input
//! length.
//!
//! ## Implicit declarations
//!
//! Assigning to a name that was never declared declares it, so
//! `m=mean(Var); Var=2*m-Var;` is accepted as written. This holds inside
//! `if`/`for`/`while` blocks too: a name first assigned in a block is
//! declared at the top of the script and keeps its value after the block.
//!
//! ## Example Scripts
//!
//! Mirror the series about its mean:
//! ```rhai
//! m = mean(Var);
//! Var = 2 * m - Var;
//! ```
//!
//! Convert kN to N:
//! ```rhai
//! Var * 1000.0
//! ```

mod engine;

pub use engine::{TransformEngine, TransformOutcome, BOUND_VARIABLE};

use crate::error::{ForceBridgeError, Result};
use crate::types::SeriesStats;
use rhai::{Engine, AST};
use std::collections::{HashMap, HashSet};

/// A whole sample series as seen by scripts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series(Vec<f64>);

impl Series {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    pub fn stats(&self) -> SeriesStats {
        SeriesStats::from_values(&self.0)
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Series {
        Series(self.0.iter().map(|&v| f(v)).collect())
    }

    /// Elementwise combination of two equally long series.
    pub fn zip_with(
        &self,
        other: &Series,
        f: impl Fn(f64, f64) -> f64,
    ) -> std::result::Result<Series, String> {
        if self.len() != other.len() {
            return Err(format!(
                "series length mismatch: {} vs {}",
                self.len(),
                other.len()
            ));
        }
        Ok(Series(
            self.0.iter().zip(&other.0).map(|(&a, &b)| f(a, b)).collect(),
        ))
    }

    /// Resolve a possibly negative index.
    pub fn index(&self, idx: i64) -> Option<usize> {
        let len = self.len() as i64;
        let idx = if idx < 0 { len + idx } else { idx };
        (0..len).contains(&idx).then_some(idx as usize)
    }

    pub fn get(&self, idx: i64) -> Option<f64> {
        self.index(idx).map(|i| self.0[i])
    }

    pub fn set(&mut self, idx: i64, value: f64) -> bool {
        match self.index(idx) {
            Some(i) => {
                self.0[i] = value;
                true
            }
            None => false,
        }
    }
}

impl From<Vec<f64>> for Series {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// A compiled transformation script
#[derive(Clone)]
pub struct CompiledTransform {
    /// The compiled AST
    ast: AST,
    /// The source as written by the user
    source: String,
    /// Name of the variable this script was compiled for
    name: String,
}

impl CompiledTransform {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn ast(&self) -> &AST {
        &self.ast
    }
}

impl std::fmt::Debug for CompiledTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledTransform")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

/// Cache for compiled scripts to avoid recompilation
#[derive(Default)]
pub struct TransformCache {
    /// Map from script source to compiled transform
    cache: HashMap<String, CompiledTransform>,
}

impl TransformCache {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Get a cached transform or compile and cache it
    pub fn get_or_compile(
        &mut self,
        engine: &Engine,
        name: &str,
        source: &str,
    ) -> Result<CompiledTransform> {
        if let Some(compiled) = self.cache.get(source) {
            return Ok(compiled.clone());
        }

        let normalized = declare_implicit_bindings(source, BOUND_VARIABLE);
        let ast = engine
            .compile(&normalized)
            .map_err(|e| ForceBridgeError::Transform(format!("Compilation error: {}", e)))?;

        let compiled = CompiledTransform {
            ast,
            source: source.to_string(),
            name: name.to_string(),
        };

        self.cache.insert(source.to_string(), compiled.clone());
        Ok(compiled)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

const KEYWORDS: &[&str] = &[
    "let", "const", "if", "else", "for", "in", "while", "loop", "do", "until", "fn", "return",
    "switch", "break", "continue", "throw", "try", "catch", "import", "export", "true", "false",
];

/// Declare assignment targets that were never declared.
///
/// Top-level assignments get `let` in place. Names assigned only inside
/// blocks are declared with `let name;` at the start of the script so the
/// value stays visible after the block.
pub fn declare_implicit_bindings(source: &str, bound: &str) -> String {
    let (block_assigned, declared_anywhere) = block_bindings(source);
    let mut declared: HashSet<&str> = HashSet::new();
    declared.insert(bound);

    let mut out = String::with_capacity(source.len() + 16);
    for name in block_assigned {
        if !declared_anywhere.contains(name) && declared.insert(name) {
            out.push_str("let ");
            out.push_str(name);
            out.push_str("; ");
        }
    }

    for statement in split_statements(source) {
        let start = code_start(statement);
        let (prefix, body) = statement.split_at(start);
        out.push_str(prefix);

        if let Some(name) = declaration_target(body) {
            declared.insert(name);
        } else if let Some(name) = assignment_target(body) {
            if declared.insert(name) {
                out.push_str("let ");
            }
        }
        out.push_str(body);
    }
    out
}

/// Walk `source` outside strings and line comments, calling `visit` with the
/// offset, byte and nesting depth after every bracket or `;`.
fn scan_structure(source: &str, mut visit: impl FnMut(usize, u8, i32)) {
    let bytes = source.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                quote = None;
            }
        } else {
            match b {
                b'"' | b'\'' | b'`' => quote = Some(b),
                b'/' if bytes.get(i + 1) == Some(&b'/') => {
                    while i < bytes.len() && bytes[i] != b'\n' {
                        i += 1;
                    }
                    continue;
                }
                b'(' | b'[' | b'{' => {
                    depth += 1;
                    visit(i, b, depth);
                }
                b')' | b']' | b'}' => {
                    depth -= 1;
                    visit(i, b, depth);
                }
                b';' => visit(i, b, depth),
                _ => {}
            }
        }
        i += 1;
    }
}

/// Split at top-level `;`, keeping the separator with its statement.
fn split_statements(source: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut begin = 0;
    scan_structure(source, |i, b, depth| {
        // A closing block ends a statement without a `;`.
        if depth == 0 && (b == b';' || b == b'}') {
            parts.push(&source[begin..=i]);
            begin = i + 1;
        }
    });
    if begin < source.len() {
        parts.push(&source[begin..]);
    }
    parts
}

/// Names assigned inside blocks, in order, and every explicitly declared name.
fn block_bindings(source: &str) -> (Vec<&str>, HashSet<&str>) {
    let mut starts = vec![(0, false)];
    scan_structure(source, |i, b, depth| {
        if matches!(b, b'{' | b';' | b'}') {
            starts.push((i + 1, depth > 0));
        }
    });

    let mut assigned = Vec::new();
    let mut declared = HashSet::new();
    for (at, nested) in starts {
        let rest = &source[at..];
        let code = &rest[code_start(rest)..];
        if let Some(name) = declaration_target(code) {
            declared.insert(name);
        } else if nested {
            if let Some(name) = assignment_target(code) {
                if !assigned.contains(&name) {
                    assigned.push(name);
                }
            }
        }
    }
    (assigned, declared)
}

/// Offset of the first code character, past whitespace and line comments.
fn code_start(statement: &str) -> usize {
    let mut rest = statement;
    loop {
        let trimmed = rest.trim_start();
        if let Some(comment) = trimmed.strip_prefix("//") {
            rest = comment.find('\n').map(|n| &comment[n..]).unwrap_or("");
        } else {
            return statement.len() - trimmed.len();
        }
    }
}

fn leading_identifier(code: &str) -> Option<(&str, &str)> {
    let first = code.chars().next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    let end = code
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(code.len());
    Some((&code[..end], &code[end..]))
}

fn declaration_target(code: &str) -> Option<&str> {
    let (keyword, rest) = leading_identifier(code)?;
    if keyword != "let" && keyword != "const" {
        return None;
    }
    leading_identifier(rest.trim_start()).map(|(name, _)| name)
}

fn assignment_target(code: &str) -> Option<&str> {
    let (name, rest) = leading_identifier(code)?;
    if KEYWORDS.contains(&name) {
        return None;
    }
    let rest = rest.trim_start();
    let after = rest.strip_prefix('=')?;
    if after.starts_with('=') {
        return None;
    }
    Some(name)
}

/// Ready-made transformation scripts
pub mod builtins {
    /// Mirror the series about its mean
    pub const MIRROR_ABOUT_MEAN: &str = "m=mean(Var); Var=2*m-Var;";

    /// Remove the mean (keep only the fluctuating part)
    pub const REMOVE_MEAN: &str = "Var - mean(Var)";

    /// Flip the sign of every sample
    pub const NEGATE: &str = "-Var";

    /// kN to N, kNm to Nm
    pub const KILO_TO_BASE: &str = "Var * 1000.0";

    /// Replace every sample with the series mean
    pub const CONSTANT_MEAN: &str = "mean(Var)";

    /// Shift so the first sample is zero
    pub const ZERO_START: &str = "Var - first(Var)";

    /// Scale to unit peak magnitude
    pub const NORMALIZE_PEAK: &str = r#"
let peak = max(abs(Var));
if peak > 0.0 { Var / peak } else { Var }
"#;

    /// List of all built-in transformations with names
    pub fn all() -> Vec<(&'static str, &'static str)> {
        vec![
            ("Mirror about mean", MIRROR_ABOUT_MEAN),
            ("Remove mean", REMOVE_MEAN),
            ("Negate", NEGATE),
            ("Kilo to base unit", KILO_TO_BASE),
            ("Constant mean", CONSTANT_MEAN),
            ("Zero start", ZERO_START),
            ("Normalize peak", NORMALIZE_PEAK),
        ]
    }
}
