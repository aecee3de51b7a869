//! Identifier sanitization for tree tokens and cache keys.

use std::path::Path;

/// Turn arbitrary text into a stable identifier.
///
/// Runs of characters outside `[A-Za-z0-9_]` collapse to a single `_`,
/// leading and trailing `_` are trimmed, a leading digit gets an `x`
/// prefix and an empty result becomes `"x"`.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;

    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }

    let trimmed = out.trim_matches('_');
    match trimmed.chars().next() {
        None => "x".to_string(),
        Some(first) if first.is_ascii_digit() => format!("x{}", trimmed),
        Some(_) => trimmed.to_string(),
    }
}

/// Cache key for a source file: file name without extension, sanitized.
pub fn source_key(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    sanitize_identifier(&stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_identifier_unchanged() {
        assert_eq!(sanitize_identifier("Root"), "Root");
        assert_eq!(sanitize_identifier("blade_1"), "blade_1");
    }

    #[test]
    fn test_collapses_runs() {
        assert_eq!(sanitize_identifier("Tower Base / Fx"), "Tower_Base_Fx");
        assert_eq!(sanitize_identifier("  (kN*m)  "), "kN_m");
        assert_eq!(sanitize_identifier("a..b"), "a_b");
    }

    #[test]
    fn test_leading_digit_and_empty() {
        assert_eq!(sanitize_identifier("3D"), "x3D");
        assert_eq!(sanitize_identifier(""), "x");
        assert_eq!(sanitize_identifier("--"), "x");
    }

    #[test]
    fn test_non_ascii_is_stripped() {
        assert_eq!(sanitize_identifier("Moment µ"), "Moment");
    }

    #[test]
    fn test_source_key() {
        assert_eq!(source_key(Path::new("/data/run 01.csv")), "run_01");
        assert_eq!(source_key(Path::new("loads.v2.xlsx")), "loads_v2");
    }

    proptest! {
        #[test]
        fn test_sanitized_is_identifier(raw in ".*") {
            let id = sanitize_identifier(&raw);
            prop_assert!(!id.is_empty());
            prop_assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
            prop_assert!(!id.chars().next().unwrap().is_ascii_digit());
        }

        #[test]
        fn test_sanitize_is_idempotent(raw in ".*") {
            let once = sanitize_identifier(&raw);
            prop_assert_eq!(sanitize_identifier(&once), once.clone());
        }
    }
}
