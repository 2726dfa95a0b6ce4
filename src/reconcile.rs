//! Collapses remapped entries that landed on the same original location.
//!
//! Minified bundles routinely map several generated statements onto one
//! original statement; counting each copy separately would inflate totals.
//! Only exact-range duplicates merge (summing hit counts); ranges that
//! merely overlap stay distinct. Output entries are sorted by start
//! position and reindexed from zero, so the result is deterministic
//! regardless of insertion order.

use std::collections::HashMap;

use crate::model::{BranchMeta, FileCoverage, FunctionMeta, Location};

fn loc_key(loc: &Location) -> String {
    format!(
        "{}:{}:{}:{}",
        loc.start.line, loc.start.column, loc.end.line, loc.end.column
    )
}

#[derive(Debug, Clone)]
struct StatementEntry {
    loc: Location,
    hits: u64,
}

#[derive(Debug, Clone)]
struct FunctionEntry {
    name: String,
    decl: Location,
    loc: Location,
    hits: u64,
}

#[derive(Debug, Clone)]
struct BranchEntry {
    branch_type: String,
    loc: Location,
    locations: Vec<Location>,
    hits: Vec<u64>,
}

/// Accumulates remapped entries for one output file until
/// [`finalize`](Self::finalize) turns them into a `FileCoverage`.
#[derive(Debug)]
pub struct FileBucket {
    path: String,
    statements: Vec<StatementEntry>,
    functions: Vec<FunctionEntry>,
    branches: Vec<BranchEntry>,
    /// Whether any contributing file carried legacy `l` counters; if so the
    /// finalized file gets them recomputed from its statements.
    track_lines: bool,
}

impl FileBucket {
    pub fn new(path: String) -> Self {
        Self {
            path,
            statements: Vec::new(),
            functions: Vec::new(),
            branches: Vec::new(),
            track_lines: false,
        }
    }

    pub fn track_lines(&mut self) {
        self.track_lines = true;
    }

    pub fn add_statement(&mut self, loc: Location, hits: u64) {
        self.statements.push(StatementEntry { loc, hits });
    }

    pub fn add_function(&mut self, name: String, decl: Location, loc: Location, hits: u64) {
        self.functions.push(FunctionEntry {
            name,
            decl,
            loc,
            hits,
        });
    }

    pub fn add_branch(
        &mut self,
        branch_type: String,
        loc: Location,
        locations: Vec<Location>,
        hits: Vec<u64>,
    ) {
        self.branches.push(BranchEntry {
            branch_type,
            loc,
            locations,
            hits,
        });
    }

    /// Decompose an existing file's entries into this bucket, preserving
    /// locations and counts.
    pub fn absorb(&mut self, fc: &FileCoverage) {
        if fc.line_hits.is_some() {
            self.track_lines = true;
        }
        for (key, loc) in &fc.statement_map {
            let hits = fc.s.get(key).copied().unwrap_or(0);
            self.add_statement(*loc, hits);
        }
        for (key, meta) in &fc.fn_map {
            let hits = fc.f.get(key).copied().unwrap_or(0);
            self.add_function(meta.name.clone(), meta.decl, meta.loc, hits);
        }
        for (key, meta) in &fc.branch_map {
            let hits = fc.b.get(key).cloned().unwrap_or_default();
            self.add_branch(meta.branch_type.clone(), meta.loc, meta.locations.clone(), hits);
        }
    }

    /// Merge duplicates, sort, and reindex into a final `FileCoverage`.
    pub fn finalize(self) -> FileCoverage {
        let mut fc = FileCoverage::new(self.path);

        // ── Statements ────────────────────────────────────────────────
        let mut merged: Vec<StatementEntry> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for entry in self.statements {
            match seen.get(&loc_key(&entry.loc)) {
                Some(&i) => merged[i].hits += entry.hits,
                None => {
                    seen.insert(loc_key(&entry.loc), merged.len());
                    merged.push(entry);
                }
            }
        }
        merged.sort_by_key(|e| (e.loc.start, e.loc.end));
        for (i, entry) in merged.into_iter().enumerate() {
            fc.statement_map.insert(i.to_string(), entry.loc);
            fc.s.insert(i.to_string(), entry.hits);
        }

        // ── Functions ─────────────────────────────────────────────────
        // Keyed by declaration range; the first name seen wins.
        let mut merged: Vec<FunctionEntry> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for entry in self.functions {
            match seen.get(&loc_key(&entry.decl)) {
                Some(&i) => merged[i].hits += entry.hits,
                None => {
                    seen.insert(loc_key(&entry.decl), merged.len());
                    merged.push(entry);
                }
            }
        }
        merged.sort_by_key(|e| (e.decl.start, e.decl.end));
        for (i, entry) in merged.into_iter().enumerate() {
            let name = if entry.name.is_empty() {
                format!("(anonymous_{i})")
            } else {
                entry.name
            };
            fc.fn_map.insert(
                i.to_string(),
                FunctionMeta {
                    name,
                    decl: entry.decl,
                    loc: entry.loc,
                },
            );
            fc.f.insert(i.to_string(), entry.hits);
        }

        // ── Branches ──────────────────────────────────────────────────
        // Duplicates must agree on the whole arm-location vector; merging
        // sums per-arm counts positionally.
        let mut merged: Vec<BranchEntry> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for entry in self.branches {
            let mut key = loc_key(&entry.loc);
            for arm in &entry.locations {
                key.push('|');
                key.push_str(&loc_key(arm));
            }
            match seen.get(&key) {
                Some(&i) if merged[i].hits.len() == entry.hits.len() => {
                    for (slot, hit) in merged[i].hits.iter_mut().zip(&entry.hits) {
                        *slot += hit;
                    }
                }
                Some(_) | None => {
                    seen.insert(key, merged.len());
                    merged.push(entry);
                }
            }
        }
        merged.sort_by_key(|e| (e.loc.start, e.loc.end));
        for (i, entry) in merged.into_iter().enumerate() {
            fc.branch_map.insert(
                i.to_string(),
                BranchMeta {
                    branch_type: entry.branch_type,
                    loc: entry.loc,
                    locations: entry.locations,
                },
            );
            fc.b.insert(i.to_string(), entry.hits);
        }

        if self.track_lines {
            fc.line_hits = Some(line_hits_from_statements(&fc));
        }

        fc
    }
}

/// Legacy `l` counters derived from the statement map: per start line, the
/// maximum hit count among statements beginning there.
fn line_hits_from_statements(fc: &FileCoverage) -> HashMap<String, u64> {
    let mut lines: HashMap<String, u64> = HashMap::new();
    for (key, loc) in &fc.statement_map {
        let hits = fc.s.get(key).copied().unwrap_or(0);
        lines
            .entry(loc.start.line.to_string())
            .and_modify(|h| *h = (*h).max(hits))
            .or_insert(hits);
    }
    lines
}
