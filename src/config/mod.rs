//! Run configuration
//!
//! A run is described by one JSON file (or TOML, when the file name ends in
//! `.toml`) naming the source tables, the output folder and the variables to
//! export.
//!
//! # Example
//!
//! ```json
//! {
//!   "input_file": ["loads_a.csv", "loads_b.xlsx"],
//!   "output_folder": "out",
//!   "configName": "tower",
//!   "fixedColCount": 8,
//!   "dataLines": [2, null],
//!   "var_to_process": {
//!     "Fx": { "outputFileName": "Fx.dat" },
//!     "My": {
//!       "transformationFunctionToTheVar": "m=mean(Var); Var=2*m-Var;",
//!       "outputFileName": "My_mirrored.dat"
//!     }
//!   }
//! }
//! ```
//!
//! # Layout
//!
//! - `<output_folder>/<configName>/` - force files
//! - `<output_folder>/<configName>/cache/` - per-file and aggregate caches

use crate::error::{ForceBridgeError, Result};
use crate::parser::{DataLines, ParseOptions, DEFAULT_FIXED_COL_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default value of `configName`
pub const DEFAULT_CONFIG_NAME: &str = "default";

/// Cache subdirectory of the run directory
pub const CACHE_DIR_NAME: &str = "cache";

/// One or several source tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputFiles {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl InputFiles {
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            InputFiles::One(path) => std::slice::from_ref(path),
            InputFiles::Many(paths) => paths,
        }
    }
}

impl Default for InputFiles {
    fn default() -> Self {
        InputFiles::Many(Vec::new())
    }
}

/// What to do with one requested variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarSpec {
    /// Script over `Var`; absent or blank means no transformation
    #[serde(
        rename = "transformationFunctionToTheVar",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transformation: Option<String>,

    /// File name under the run directory
    #[serde(
        rename = "outputFileName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub output_file_name: Option<String>,
}

impl VarSpec {
    /// The transformation, if one is set and not blank.
    pub fn transformation(&self) -> Option<&str> {
        self.transformation
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The output file name, if one is set and not blank.
    pub fn output_file_name(&self) -> Option<&str> {
        self.output_file_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Complete description of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub input_file: InputFiles,

    #[serde(default)]
    pub output_folder: PathBuf,

    /// Variable name to processing instructions
    #[serde(default)]
    pub var_to_process: BTreeMap<String, VarSpec>,

    /// Number of leading descriptor columns
    #[serde(rename = "fixedColCount", default = "default_fixed_col_count")]
    pub fixed_col_count: usize,

    /// Rows read from every source table
    #[serde(rename = "dataLines", default)]
    pub data_lines: DataLines,

    /// Namespaces the run directory and the aggregate cache
    #[serde(rename = "configName", default = "default_config_name")]
    pub config_name: String,
}

fn default_fixed_col_count() -> usize {
    DEFAULT_FIXED_COL_COUNT
}

fn default_config_name() -> String {
    DEFAULT_CONFIG_NAME.to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input_file: InputFiles::default(),
            output_folder: PathBuf::new(),
            var_to_process: BTreeMap::new(),
            fixed_col_count: DEFAULT_FIXED_COL_COUNT,
            data_lines: DataLines::default(),
            config_name: default_config_name(),
        }
    }
}

impl RunConfig {
    /// Load a configuration file from disk
    ///
    /// Relative input and output paths are taken relative to the
    /// configuration file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ForceBridgeError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let mut config = Self::parse(&content, is_toml(path)).map_err(|e| match e {
            ForceBridgeError::Config(msg) => {
                ForceBridgeError::Config(format!("{:?}: {}", path, msg))
            }
            other => other,
        })?;

        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text without validating it.
    pub fn parse(content: &str, toml_format: bool) -> Result<Self> {
        if toml_format {
            toml::from_str(content)
                .map_err(|e| ForceBridgeError::Config(format!("Invalid TOML: {}", e)))
        } else {
            serde_json::from_str(content)
                .map_err(|e| ForceBridgeError::Config(format!("Invalid JSON: {}", e)))
        }
    }

    /// Check required fields and value ranges.
    pub fn validate(&self) -> Result<()> {
        let inputs = self.input_file.paths();
        if inputs.is_empty() {
            return Err(ForceBridgeError::Config(
                "input_file must name at least one source file".to_string(),
            ));
        }
        if inputs.iter().any(|p| p.as_os_str().is_empty()) {
            return Err(ForceBridgeError::Config(
                "input_file contains a blank entry".to_string(),
            ));
        }
        if self.output_folder.as_os_str().is_empty() {
            return Err(ForceBridgeError::Config(
                "output_folder is required".to_string(),
            ));
        }
        if self.fixed_col_count < DEFAULT_FIXED_COL_COUNT {
            return Err(ForceBridgeError::Config(format!(
                "fixedColCount must be at least {}, got {}",
                DEFAULT_FIXED_COL_COUNT, self.fixed_col_count
            )));
        }
        if self.data_lines.start == 0 {
            return Err(ForceBridgeError::Config(
                "dataLines start is 1-based and must be at least 1".to_string(),
            ));
        }
        if let Some(end) = self.data_lines.end {
            if end < self.data_lines.start {
                return Err(ForceBridgeError::Config(format!(
                    "dataLines end {} is before start {}",
                    end, self.data_lines.start
                )));
            }
        }
        if self.config_name.trim().is_empty() {
            return Err(ForceBridgeError::Config(
                "configName must not be blank".to_string(),
            ));
        }
        if self.var_to_process.is_empty() {
            tracing::warn!("var_to_process is empty; only the caches will be built");
        }
        Ok(())
    }

    pub fn inputs(&self) -> &[PathBuf] {
        self.input_file.paths()
    }

    /// Directory receiving this configuration's force files
    pub fn run_dir(&self) -> PathBuf {
        self.output_folder.join(&self.config_name)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.run_dir().join(CACHE_DIR_NAME)
    }

    /// Name the aggregate cache is stored under
    pub fn aggregate_key(&self) -> &str {
        &self.config_name
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            fixed_col_count: self.fixed_col_count,
            data_lines: self.data_lines,
        }
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() && !p.as_os_str().is_empty() {
                *p = base.join(&*p);
            }
        };
        match &mut self.input_file {
            InputFiles::One(path) => join(path),
            InputFiles::Many(paths) => paths.iter_mut().for_each(join),
        }
        join(&mut self.output_folder);
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "input_file": "loads.csv",
        "output_folder": "out",
        "var_to_process": {
            "Fx": { "outputFileName": "Fx.dat" },
            "My": {
                "transformationFunctionToTheVar": "Var * 2",
                "outputFileName": "My.dat"
            }
        }
    }"#;

    #[test]
    fn test_defaults() {
        let config = RunConfig::parse(SAMPLE, false).unwrap();
        config.validate().unwrap();

        assert_eq!(config.fixed_col_count, 8);
        assert_eq!(config.data_lines, DataLines::new(2, None));
        assert_eq!(config.config_name, "default");
        assert_eq!(config.inputs(), &[PathBuf::from("loads.csv")]);
        assert_eq!(config.run_dir(), PathBuf::from("out").join("default"));
        assert_eq!(
            config.cache_dir(),
            PathBuf::from("out").join("default").join("cache")
        );
        assert_eq!(config.var_to_process["My"].transformation(), Some("Var * 2"));
        assert_eq!(config.var_to_process["Fx"].transformation(), None);
    }

    #[test]
    fn test_input_list_and_overrides() {
        let json = r#"{
            "input_file": ["a.csv", "b.xlsx"],
            "output_folder": "out",
            "var_to_process": {},
            "fixedColCount": 10,
            "dataLines": [3, 20],
            "configName": "tower"
        }"#;
        let config = RunConfig::parse(json, false).unwrap();
        config.validate().unwrap();

        assert_eq!(config.inputs().len(), 2);
        assert_eq!(config.data_lines, DataLines::new(3, Some(20)));
        assert_eq!(config.aggregate_key(), "tower");
        assert_eq!(config.parse_options().fixed_col_count, 10);
    }

    #[test]
    fn test_toml() {
        let text = r#"
input_file = ["a.csv"]
output_folder = "out"
configName = "t"
dataLines = [2, 9]

[var_to_process.Fx]
outputFileName = "Fx.dat"
"#;
        let config = RunConfig::parse(text, true).unwrap();
        config.validate().unwrap();
        assert_eq!(config.data_lines, DataLines::new(2, Some(9)));
        assert_eq!(
            config.var_to_process["Fx"].output_file_name(),
            Some("Fx.dat")
        );
    }

    #[test]
    fn test_validation_errors() {
        let base = RunConfig::parse(SAMPLE, false).unwrap();

        let mut c = base.clone();
        c.input_file = InputFiles::Many(vec![]);
        assert!(matches!(c.validate(), Err(ForceBridgeError::Config(_))));

        let mut c = base.clone();
        c.output_folder = PathBuf::new();
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.fixed_col_count = 7;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.data_lines = DataLines::new(0, None);
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.data_lines = DataLines::new(5, Some(4));
        assert!(c.validate().is_err());

        let mut c = base;
        c.config_name = "  ".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = RunConfig::parse("{ not json", false).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_blank_output_name() {
        let spec = VarSpec {
            transformation: Some("   ".into()),
            output_file_name: Some("".into()),
        };
        assert_eq!(spec.transformation(), None);
        assert_eq!(spec.output_file_name(), None);
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.inputs(), &[dir.path().join("loads.csv")]);
        assert_eq!(config.output_folder, dir.path().join("out"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = RunConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ForceBridgeError::Config(_)));
    }
}
