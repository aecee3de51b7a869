//! Rhai Transformation Engine Implementation
//!
//! Registers the [`Series`] type, its operators and functions on a Rhai
//! engine with safety limits, and evaluates transformation scripts against
//! one bound variable.

use crate::error::{ForceBridgeError, Result, ResultExt};
use crate::scripting::{CompiledTransform, Series, TransformCache};
use crate::types::SeriesStats;
use rhai::{Dynamic, Engine, EvalAltResult, Scope};

/// Name of the variable holding the series inside scripts
pub const BOUND_VARIABLE: &str = "Var";

type RhaiResult<T> = std::result::Result<T, Box<EvalAltResult>>;

/// A transformed series together with comparison diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutcome {
    pub original: Vec<f64>,
    pub transformed: Vec<f64>,
    /// Smallest `transformed - original` over samples where both are numbers
    pub min_diff: f64,
    /// Largest `transformed - original` over samples where both are numbers
    pub max_diff: f64,
}

impl TransformOutcome {
    pub fn new(original: Vec<f64>, transformed: Vec<f64>) -> Self {
        let diffs = SeriesStats::from_values(
            &original
                .iter()
                .zip(&transformed)
                .map(|(a, b)| b - a)
                .collect::<Vec<_>>(),
        );
        Self {
            original,
            transformed,
            min_diff: diffs.min(),
            max_diff: diffs.max(),
        }
    }

    /// (original, transformed) sample pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.original
            .iter()
            .copied()
            .zip(self.transformed.iter().copied())
    }
}

/// Evaluates transformation scripts over a whole series.
pub struct TransformEngine {
    /// The Rhai engine instance
    engine: Engine,
    /// Cache of compiled scripts
    cache: TransformCache,
}

impl TransformEngine {
    /// Create a new engine with the series functions registered
    pub fn new() -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);

        Self {
            engine,
            cache: TransformCache::new(),
        }
    }

    /// Configure the Rhai engine with series support and safety limits
    fn configure_engine(engine: &mut Engine) {
        // Set safety limits
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(1_000_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000_000);
        engine.set_max_map_size(1_000);
        engine.disable_symbol("eval");

        engine.on_print(|text| tracing::info!("[script] {}", text));
        engine.on_debug(|text, _source, pos| tracing::debug!("[script] {:?} {}", pos, text));

        engine.register_type_with_name::<Series>("Series");

        // ===== Arithmetic =====

        register_arithmetic(engine, "+", |a, b| a + b);
        register_arithmetic(engine, "-", |a, b| a - b);
        register_arithmetic(engine, "*", |a, b| a * b);
        register_arithmetic(engine, "/", |a, b| a / b);
        register_arithmetic(engine, "**", f64::powf);

        engine.register_fn("-", |s: Series| s.map(|v| -v));

        // ===== Indexing =====

        engine.register_indexer_get(|s: &mut Series, idx: i64| -> RhaiResult<f64> {
            s.get(idx)
                .ok_or_else(|| format!("Index {} out of bounds for series of {}", idx, s.len()).into())
        });
        engine.register_indexer_set(
            |s: &mut Series, idx: i64, value: f64| -> RhaiResult<()> {
                if s.set(idx, value) {
                    Ok(())
                } else {
                    Err(format!("Index {} out of bounds for series of {}", idx, s.len()).into())
                }
            },
        );
        engine.register_indexer_set(
            |s: &mut Series, idx: i64, value: i64| -> RhaiResult<()> {
                if s.set(idx, value as f64) {
                    Ok(())
                } else {
                    Err(format!("Index {} out of bounds for series of {}", idx, s.len()).into())
                }
            },
        );

        // ===== Aggregates (NaN skipped) =====

        engine.register_fn("mean", |s: &mut Series| s.stats().mean());
        engine.register_fn("sum", |s: &mut Series| s.stats().sum);
        engine.register_fn("min", |s: &mut Series| s.stats().min());
        engine.register_fn("max", |s: &mut Series| s.stats().max());
        engine.register_fn("std", |s: &mut Series| s.stats().std());
        engine.register_fn("rms", |s: &mut Series| s.stats().rms());
        engine.register_fn("len", |s: &mut Series| s.len() as i64);
        engine.register_fn("first", |s: &mut Series| s.get(0).unwrap_or(f64::NAN));
        engine.register_fn("last", |s: &mut Series| s.get(-1).unwrap_or(f64::NAN));

        // ===== Elementwise functions =====

        engine.register_fn("abs", |s: &mut Series| s.map(f64::abs));
        engine.register_fn("sqrt", |s: &mut Series| s.map(f64::sqrt));
        engine.register_fn("exp", |s: &mut Series| s.map(f64::exp));
        engine.register_fn("ln", |s: &mut Series| s.map(f64::ln));
        engine.register_fn("sin", |s: &mut Series| s.map(f64::sin));
        engine.register_fn("cos", |s: &mut Series| s.map(f64::cos));
        engine.register_fn("clamp", |s: &mut Series, lo: f64, hi: f64| {
            s.map(|v| if v.is_nan() { v } else { v.max(lo).min(hi) })
        });
    }

    /// Compile a script and cache it
    pub fn compile(&mut self, name: &str, source: &str) -> Result<CompiledTransform> {
        self.cache.get_or_compile(&self.engine, name, source)
    }

    /// Run a compiled script over `values`.
    ///
    /// The result always has the same length as `values`.
    pub fn execute(&self, compiled: &CompiledTransform, values: &[f64]) -> Result<Vec<f64>> {
        let mut scope = Scope::new();
        scope.push(BOUND_VARIABLE, Series::new(values.to_vec()));

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, compiled.ast())
            .with_context(|| format!("Evaluating transformation for '{}'", compiled.name()))?;

        let output = if is_series_like(&result) {
            result
        } else {
            scope.get(BOUND_VARIABLE).cloned().unwrap_or(Dynamic::UNIT)
        };

        series_from_dynamic(output, values.len())
            .map_err(|e| e.with_context(format!("Transformation for '{}'", compiled.name())))
    }

    /// Compile (or reuse) and execute `source` over `values`.
    pub fn apply(&mut self, name: &str, source: &str, values: &[f64]) -> Result<Vec<f64>> {
        let compiled = self.compile(name, source)?;
        self.execute(&compiled, values)
    }

    /// Apply `source` and pair the result with the original for comparison.
    pub fn transform(&mut self, name: &str, source: &str, values: &[f64]) -> Result<TransformOutcome> {
        let transformed = self.apply(name, source, values)?;
        Ok(TransformOutcome::new(values.to_vec(), transformed))
    }

    /// Validate a script without executing it
    pub fn validate(&self, source: &str) -> Result<()> {
        let normalized = crate::scripting::declare_implicit_bindings(source, BOUND_VARIABLE);
        self.engine
            .compile(&normalized)
            .map(|_| ())
            .map_err(|e| ForceBridgeError::Transform(format!("Validation error: {}", e)))
    }

    /// Get a reference to the underlying Rhai engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl Default for TransformEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransformEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformEngine")
            .field("cache_size", &self.cache.len())
            .finish()
    }
}

/// Register `op` for every series/number operand combination.
fn register_arithmetic(engine: &mut Engine, op: &str, f: fn(f64, f64) -> f64) {
    engine.register_fn(op, move |a: Series, b: Series| -> RhaiResult<Series> {
        a.zip_with(&b, f).map_err(|e| e.into())
    });
    engine.register_fn(op, move |a: Series, b: f64| a.map(|v| f(v, b)));
    engine.register_fn(op, move |a: f64, b: Series| b.map(|v| f(a, v)));
    engine.register_fn(op, move |a: Series, b: i64| a.map(|v| f(v, b as f64)));
    engine.register_fn(op, move |a: i64, b: Series| b.map(|v| f(a as f64, v)));
}

fn is_series_like(value: &Dynamic) -> bool {
    value.is::<Series>() || value.is_float() || value.is_int() || value.is_array()
}

/// Convert a script result into a series of exactly `len` samples.
fn series_from_dynamic(value: Dynamic, len: usize) -> Result<Vec<f64>> {
    let type_name = value.type_name();

    let values = if value.is::<Series>() {
        value.cast::<Series>().into_inner()
    } else if let Ok(v) = value.as_float() {
        vec![v; len]
    } else if let Ok(v) = value.as_int() {
        vec![v as f64; len]
    } else if value.is_array() {
        let array = value
            .into_array()
            .map_err(|e| ForceBridgeError::Transform(e.to_string()))?;
        array
            .into_iter()
            .map(|item| {
                item.as_float()
                    .or_else(|_| item.as_int().map(|i| i as f64))
                    .map_err(|t| {
                        ForceBridgeError::Transform(format!("array element of type {}", t))
                    })
            })
            .collect::<Result<Vec<f64>>>()?
    } else {
        return Err(ForceBridgeError::Transform(format!(
            "script must produce a series or a number, got {}",
            type_name
        )));
    };

    if values.len() != len {
        return Err(ForceBridgeError::Transform(format!(
            "script produced {} samples, expected {}",
            values.len(),
            len
        )));
    }
    Ok(values)
}
