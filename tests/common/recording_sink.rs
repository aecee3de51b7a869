//! Diagnostic sink that keeps every comparison for later assertions

use forcebridge_rs::DiagnosticSink;

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub label: String,
    pub original: Vec<f64>,
    pub transformed: Vec<f64>,
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub comparisons: Vec<Comparison>,
}

impl DiagnosticSink for RecordingSink {
    fn compare(&mut self, label: &str, original: &[f64], transformed: &[f64]) {
        self.comparisons.push(Comparison {
            label: label.to_string(),
            original: original.to_vec(),
            transformed: transformed.to_vec(),
        });
    }
}
