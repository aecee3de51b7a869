//! Test data builders for source tables and run configurations

use forcebridge_rs::RunConfig;
use std::path::{Path, PathBuf};

/// Builder for one source table row
pub struct RowBuilder {
    short_name: String,
    qualified_name: String,
    xunit: String,
    yunit: String,
    ten: String,
    dx: String,
    x0: String,
    values: Vec<String>,
}

impl RowBuilder {
    pub fn new(short_name: &str, qualified_name: &str) -> Self {
        Self {
            short_name: short_name.to_string(),
            qualified_name: qualified_name.to_string(),
            xunit: "s".to_string(),
            yunit: "kN".to_string(),
            ten: String::new(),
            dx: "0.1".to_string(),
            x0: "0".to_string(),
            values: Vec::new(),
        }
    }

    pub fn yunit(mut self, unit: &str) -> Self {
        self.yunit = unit.to_string();
        self
    }

    pub fn dx(mut self, dx: &str) -> Self {
        self.dx = dx.to_string();
        self
    }

    /// Raw `ten=` text; defaults to the number of values.
    pub fn ten(mut self, ten: &str) -> Self {
        self.ten = ten.to_string();
        self
    }

    pub fn values(mut self, values: &[f64]) -> Self {
        self.values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    /// Raw sample cells, for non-numeric content.
    pub fn raw_values(mut self, values: &[&str]) -> Self {
        self.values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn cells(&self) -> Vec<String> {
        let ten = if self.ten.is_empty() {
            self.values.len().to_string()
        } else {
            self.ten.clone()
        };
        let mut cells = vec![
            self.short_name.clone(),
            String::new(),
            self.qualified_name.clone(),
            format!("xunit={}", self.xunit),
            format!("yunit={}", self.yunit),
            format!("ten={}", ten),
            format!("dx={}", self.dx),
            format!("x0={}", self.x0),
        ];
        cells.extend(self.values.iter().cloned());
        cells
    }
}

/// Builder for a CSV source table with a header row
#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<RowBuilder>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, row: RowBuilder) -> Self {
        self.rows.push(row);
        self
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::from("name,,path,xunit,yunit,ten,dx,x0,data\n");
        for row in &self.rows {
            out.push_str(&row.cells().join(","));
            out.push('\n');
        }
        out
    }

    pub fn write(&self, dir: &Path, file_name: &str) -> PathBuf {
        super::write_file(dir, file_name, &self.to_csv())
    }
}

/// Builder for a run configuration
pub struct ConfigBuilder {
    config: RunConfig,
}

impl ConfigBuilder {
    pub fn new(output_folder: &Path) -> Self {
        let config = RunConfig {
            output_folder: output_folder.to_path_buf(),
            ..RunConfig::default()
        };
        Self { config }
    }

    pub fn input(mut self, path: &Path) -> Self {
        let mut paths = self.config.inputs().to_vec();
        paths.push(path.to_path_buf());
        self.config.input_file = forcebridge_rs::config::InputFiles::Many(paths);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.config.config_name = name.to_string();
        self
    }

    pub fn variable(mut self, name: &str, output: Option<&str>, script: Option<&str>) -> Self {
        self.config.var_to_process.insert(
            name.to_string(),
            forcebridge_rs::VarSpec {
                transformation: script.map(String::from),
                output_file_name: output.map(String::from),
            },
        );
        self
    }

    pub fn build(self) -> RunConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_builder_defaults_ten() {
        let row = RowBuilder::new("Fx", "Tower.Fx").values(&[1.0, 2.5]);
        let cells = row.cells();
        assert_eq!(cells[5], "ten=2");
        assert_eq!(&cells[8..], &["1", "2.5"]);
    }
}
