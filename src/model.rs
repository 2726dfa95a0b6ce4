//! In-memory representation of Istanbul-style coverage data and of the
//! source map document attached to a generated file. Field names follow the
//! JSON schema so a report can be read, remapped, and written back in the
//! same shape.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A point in a file. Lines are 1-based in Istanbul data, columns 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A range: inclusive on lines, half-open on columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start: Position,
    pub end: Position,
}

impl Location {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// start ≤ end under (line, column) ordering.
    pub fn is_ordered(&self) -> bool {
        (self.start.line, self.start.column) <= (self.end.line, self.end.column)
    }
}

/// A function entry: declaration site plus body span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMeta {
    pub name: String,
    pub decl: Location,
    pub loc: Location,
}

/// A branch entry: overall span plus one location per arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchMeta {
    #[serde(rename = "type")]
    pub branch_type: String,
    pub loc: Location,
    pub locations: Vec<Location>,
}

/// A version-3 source map document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMap {
    pub version: u32,
    pub sources: Vec<String>,
    #[serde(default)]
    pub names: Vec<String>,
    pub mappings: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(rename = "sourceRoot", skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    #[serde(rename = "sourcesContent", skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<String>>,
}

impl SourceMap {
    /// Source path at `index`, with `sourceRoot` prepended when present.
    pub fn resolved_source(&self, index: usize) -> Option<String> {
        let source = self.sources.get(index)?;
        match self.source_root.as_deref() {
            Some(root) if !root.is_empty() => {
                Some(format!("{}/{}", root.trim_end_matches('/'), source))
            }
            _ => Some(source.clone()),
        }
    }
}

/// Coverage data for a single generated file, as found in
/// `coverage-final.json`. The string keys of the `*Map` objects pair with
/// the same keys in `s`/`f`/`b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCoverage {
    #[serde(default)]
    pub path: String,
    #[serde(rename = "statementMap", default)]
    pub statement_map: HashMap<String, Location>,
    #[serde(rename = "fnMap", default)]
    pub fn_map: HashMap<String, FunctionMeta>,
    #[serde(rename = "branchMap", default)]
    pub branch_map: HashMap<String, BranchMeta>,
    #[serde(default)]
    pub s: HashMap<String, u64>,
    #[serde(default)]
    pub f: HashMap<String, u64>,
    #[serde(default)]
    pub b: HashMap<String, Vec<u64>>,
    /// Legacy per-line counters. Recomputed from statements after a remap.
    #[serde(rename = "l", skip_serializing_if = "Option::is_none")]
    pub line_hits: Option<HashMap<String, u64>>,
    #[serde(rename = "inputSourceMap", skip_serializing_if = "Option::is_none")]
    pub input_source_map: Option<SourceMap>,
}

impl FileCoverage {
    pub fn new(path: String) -> Self {
        Self {
            path,
            statement_map: HashMap::new(),
            fn_map: HashMap::new(),
            branch_map: HashMap::new(),
            s: HashMap::new(),
            f: HashMap::new(),
            b: HashMap::new(),
            line_hits: None,
            input_source_map: None,
        }
    }
}

/// A whole coverage report: generated file path → its coverage.
pub type CoverageMap = HashMap<String, FileCoverage>;
