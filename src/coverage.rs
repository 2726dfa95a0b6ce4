//! Reader/writer for Istanbul-style `coverage-final.json` reports.
//!
//! The top-level document is a JSON object keyed by generated file path.
//! Entries are decoded one at a time so a single damaged entry fails alone:
//! the rest of the report still loads, and the damage is reported as an
//! `InvalidCoverageSchema` diagnostic with the file path attached.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::diag::{Diagnostic, DiagnosticKind};
use crate::error::{CovmapError, Result};
use crate::model::{CoverageMap, FileCoverage};

/// A loaded report plus per-entry schema problems.
#[derive(Debug)]
pub struct ParsedReport {
    pub coverage: CoverageMap,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a coverage report from raw JSON bytes.
pub fn parse(input: &[u8]) -> Result<ParsedReport> {
    let root: Value = serde_json::from_slice(input)?;
    let Value::Object(entries) = root else {
        return Err(CovmapError::Other(
            "coverage report must be a JSON object keyed by file path".to_string(),
        ));
    };

    let mut coverage = CoverageMap::new();
    let mut diagnostics = Vec::new();

    for (path, entry) in entries {
        match serde_json::from_value::<FileCoverage>(entry) {
            Ok(mut fc) => {
                // Some emitters omit the redundant `path` field; the key is
                // authoritative either way.
                if fc.path.is_empty() {
                    fc.path = path.clone();
                }
                coverage.insert(path, fc);
            }
            Err(e) => {
                diagnostics.push(Diagnostic::for_file(
                    DiagnosticKind::InvalidCoverageSchema,
                    &path,
                    e.to_string(),
                ));
            }
        }
    }

    Ok(ParsedReport {
        coverage,
        diagnostics,
    })
}

/// Serialize a coverage map back into report JSON, file keys sorted for
/// deterministic output.
pub fn to_json_string(coverage: &CoverageMap, pretty: bool) -> Result<String> {
    let ordered: BTreeMap<&String, &FileCoverage> = coverage.iter().collect();
    let out = if pretty {
        serde_json::to_string_pretty(&ordered)?
    } else {
        serde_json::to_string(&ordered)?
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_report() {
        let input = br#"{
            "dist/app.js": {
                "path": "dist/app.js",
                "statementMap": {
                    "0": {"start": {"line": 1, "column": 0}, "end": {"line": 1, "column": 25}}
                },
                "fnMap": {},
                "branchMap": {},
                "s": {"0": 5},
                "f": {},
                "b": {}
            }
        }"#;
        let report = parse(input).unwrap();
        assert!(report.diagnostics.is_empty());
        assert_eq!(report.coverage.len(), 1);
        assert_eq!(report.coverage["dist/app.js"].s.get("0"), Some(&5));
    }

    #[test]
    fn test_parse_fills_path_from_key() {
        let input = br#"{
            "dist/app.js": {
                "statementMap": {},
                "fnMap": {},
                "branchMap": {},
                "s": {},
                "f": {},
                "b": {}
            }
        }"#;
        let report = parse(input).unwrap();
        assert_eq!(report.coverage["dist/app.js"].path, "dist/app.js");
    }

    #[test]
    fn test_parse_damaged_entry_fails_alone() {
        // The first entry's statement location is structurally wrong; the
        // second entry must still load.
        let input = br#"{
            "dist/bad.js": {
                "statementMap": { "0": { "start": "nope" } },
                "fnMap": {}, "branchMap": {},
                "s": {}, "f": {}, "b": {}
            },
            "dist/good.js": {
                "statementMap": {}, "fnMap": {}, "branchMap": {},
                "s": {}, "f": {}, "b": {}
            }
        }"#;
        let report = parse(input).unwrap();
        assert_eq!(report.coverage.len(), 1);
        assert!(report.coverage.contains_key("dist/good.js"));
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(
            report.diagnostics[0].kind,
            DiagnosticKind::InvalidCoverageSchema
        );
        assert_eq!(report.diagnostics[0].file.as_deref(), Some("dist/bad.js"));
    }

    #[test]
    fn test_parse_rejects_non_object_root() {
        assert!(parse(b"[1, 2, 3]").is_err());
        assert!(parse(b"not json").is_err());
    }

    #[test]
    fn test_parse_empty_object() {
        let report = parse(b"{}").unwrap();
        assert!(report.coverage.is_empty());
    }

    #[test]
    fn test_output_round_trips() {
        let input = br#"{
            "dist/app.js": {
                "path": "dist/app.js",
                "statementMap": {
                    "0": {"start": {"line": 1, "column": 0}, "end": {"line": 2, "column": 1}}
                },
                "fnMap": {},
                "branchMap": {},
                "s": {"0": 2},
                "f": {},
                "b": {}
            }
        }"#;
        let report = parse(input).unwrap();
        let out = to_json_string(&report.coverage, true).unwrap();
        let again = parse(out.as_bytes()).unwrap();
        assert_eq!(
            again.coverage["dist/app.js"].statement_map,
            report.coverage["dist/app.js"].statement_map
        );
    }
}
