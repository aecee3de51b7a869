//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod recording_sink;

use std::path::{Path, PathBuf};

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Write `content` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write fixture");
    path
}

/// Sample values (fifth column) of a force file.
pub fn force_file_values(path: &Path) -> Vec<f64> {
    let text = std::fs::read_to_string(path).expect("read force file");
    text.lines()
        .filter(|l| !l.starts_with('#'))
        .skip(3)
        .map(|l| {
            let columns: Vec<&str> = l.split_whitespace().collect();
            assert_eq!(columns.len(), 6, "bad data line: {}", l);
            columns[4].parse().expect("numeric value column")
        })
        .collect()
}
