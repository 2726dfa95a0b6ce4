//! Translates coverage locations from generated coordinates to original
//! coordinates and rebuilds the report keyed by original source paths.
//!
//! The pipeline never drops hit counts: entries that cannot be remapped
//! pass through unchanged under their generated path, with a diagnostic.

use std::collections::HashMap;

use tracing::debug;

use crate::cache::{DecodedMap, SourceMapCache};
use crate::diag::{Diagnostic, DiagnosticKind};
use crate::model::{CoverageMap, FileCoverage, Location, Position};
use crate::reconcile::FileBucket;

/// What to do with a branch arm whose sub-range fails to remap while its
/// siblings succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmappedArmPolicy {
    /// Keep the arm at its generated-coordinate location with its count
    /// zeroed.
    Zero,
    /// Keep the arm at its generated-coordinate location with its original
    /// count (degraded but not lost).
    #[default]
    Keep,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemapConfig {
    pub unmapped_arms: UnmappedArmPolicy,
}

/// Result of a transform: the rewritten coverage plus everything that went
/// wrong along the way.
#[derive(Debug)]
pub struct TransformOutcome {
    pub coverage: CoverageMap,
    pub diagnostics: Vec<Diagnostic>,
}

/// A location translated into an original file.
#[derive(Debug, Clone, PartialEq)]
struct MappedLocation {
    source: String,
    loc: Location,
}

/// Translate one generated position. Istanbul lines are 1-based, source map
/// lines 0-based; columns are 0-based on both sides.
fn map_position(doc: &DecodedMap, pos: Position) -> Option<(u32, Position)> {
    let line = pos.line.checked_sub(1)?;
    let seg = doc.index.lookup(line, pos.column)?;
    let orig = seg.original?;
    Some((orig.source, Position::new(orig.line + 1, orig.column)))
}

/// Translate a range. When the endpoints land in different original files
/// the end is clipped to the last segment inside the generated range that
/// still maps to the start's file. Returns None when either endpoint is
/// unmapped or the translated range comes out inverted.
fn map_location(doc: &DecodedMap, loc: Location) -> Option<MappedLocation> {
    let (start_source, start) = map_position(doc, loc.start)?;
    let (end_source, mut end) = map_position(doc, loc.end)?;

    if end_source != start_source {
        let gen_start = (loc.start.line.checked_sub(1)?, loc.start.column);
        let gen_end = (loc.end.line.checked_sub(1)?, loc.end.column);
        let clipped = doc
            .index
            .segments_between(gen_start, gen_end)
            .iter()
            .rev()
            .find_map(|seg| seg.original.filter(|o| o.source == start_source))?;
        debug!(
            from = doc.sources.get(end_source as usize).map(String::as_str),
            to = doc.sources.get(start_source as usize).map(String::as_str),
            "range spans two sources, clipping end"
        );
        end = Position::new(clipped.line + 1, clipped.column);
    }

    let mapped = Location::new(start, end);
    if !mapped.is_ordered() {
        return None;
    }
    let source = doc.sources.get(start_source as usize)?.clone();
    Some(MappedLocation {
        source,
        loc: mapped,
    })
}

/// Bucket key: path with separators flattened, so `src/a.ts` seen through
/// different maps lands in one bucket regardless of separator style.
fn unique_key(path: &str) -> String {
    path.replace(['/', '\\'], "_")
}

fn bucket_for<'a>(
    buckets: &'a mut HashMap<String, FileBucket>,
    source: &str,
    track_lines: bool,
) -> &'a mut FileBucket {
    let bucket = buckets
        .entry(unique_key(source))
        .or_insert_with(|| FileBucket::new(source.to_string()));
    if track_lines {
        bucket.track_lines();
    }
    bucket
}

pub struct Remapper {
    config: RemapConfig,
    cache: SourceMapCache,
}

impl Remapper {
    pub fn new(config: RemapConfig) -> Self {
        Self::with_cache(config, SourceMapCache::new())
    }

    /// Reuse a cache across invocations so repeated transforms against the
    /// same maps skip redecoding.
    pub fn with_cache(config: RemapConfig, cache: SourceMapCache) -> Self {
        Self { config, cache }
    }

    pub fn into_cache(self) -> SourceMapCache {
        self.cache
    }

    /// Remap a whole coverage report. Files without a resolvable source map
    /// pass through unchanged; everything else is rebuilt under original
    /// source paths and reconciled.
    pub fn transform(&mut self, coverage: CoverageMap) -> TransformOutcome {
        let mut diagnostics = Vec::new();
        let mut buckets: HashMap<String, FileBucket> = HashMap::new();
        let mut passthrough: Vec<FileCoverage> = Vec::new();

        // Sorted for deterministic bucket creation and diagnostics order.
        let mut files: Vec<(String, FileCoverage)> = coverage.into_iter().collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));

        for (path, fc) in files {
            let Some(map) = fc.input_source_map.clone() else {
                diagnostics.push(Diagnostic::for_file(
                    DiagnosticKind::MissingSourceMap,
                    &path,
                    "no source map; entries pass through unchanged",
                ));
                passthrough.push(fc);
                continue;
            };

            let doc = self.cache.get_or_decode(&map);
            diagnostics.extend(doc.diagnostics.iter().cloned());

            let leftover = self.remap_file(&fc, &doc, &mut buckets, &mut diagnostics);
            if let Some(leftover) = leftover {
                passthrough.push(leftover);
            }
        }

        let mut result: CoverageMap = HashMap::new();
        let mut finalized: Vec<FileCoverage> = buckets.into_values().map(FileBucket::finalize).collect();

        // Entries that passed through keep their generated identity; if a
        // remapped bucket claimed the same path, fold them together.
        for fc in passthrough {
            if let Some(pos) = finalized.iter().position(|f| f.path == fc.path) {
                let existing = finalized.swap_remove(pos);
                let mut bucket = FileBucket::new(fc.path.clone());
                bucket.absorb(&existing);
                bucket.absorb(&fc);
                finalized.push(bucket.finalize());
            } else {
                result.insert(fc.path.clone(), fc);
            }
        }
        for fc in finalized {
            result.insert(fc.path.clone(), fc);
        }

        TransformOutcome {
            coverage: result,
            diagnostics,
        }
    }

    /// Remap one file's entries into the shared buckets. Returns a coverage
    /// object holding the entries that could not be remapped, if any; those
    /// keep their original keys, locations, and counts.
    fn remap_file(
        &self,
        fc: &FileCoverage,
        doc: &DecodedMap,
        buckets: &mut HashMap<String, FileBucket>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<FileCoverage> {
        let mut leftover = FileCoverage::new(fc.path.clone());
        let mut changes = 0usize;
        let track_lines = fc.line_hits.is_some();

        // ── Statements ────────────────────────────────────────────────
        for (key, loc) in &fc.statement_map {
            let hits = fc.s.get(key).copied().unwrap_or(0);
            match map_location(doc, *loc) {
                Some(mapped) => {
                    changes += 1;
                    bucket_for(buckets, &mapped.source, track_lines)
                        .add_statement(mapped.loc, hits);
                }
                None => {
                    diagnostics.push(Diagnostic::for_file(
                        DiagnosticKind::UnresolvableRange,
                        &fc.path,
                        format!("statement {key} has no stable original range"),
                    ));
                    leftover.statement_map.insert(key.clone(), *loc);
                    leftover.s.insert(key.clone(), hits);
                }
            }
        }

        // ── Functions ─────────────────────────────────────────────────
        // Declaration and body must resolve into the same file; a function
        // split across sources is not meaningful.
        for (key, meta) in &fc.fn_map {
            let hits = fc.f.get(key).copied().unwrap_or(0);
            let decl = map_location(doc, meta.decl);
            let body = map_location(doc, meta.loc);
            match (decl, body) {
                (Some(decl), Some(body)) if decl.source == body.source => {
                    changes += 1;
                    bucket_for(buckets, &decl.source, track_lines).add_function(
                        meta.name.clone(),
                        decl.loc,
                        body.loc,
                        hits,
                    );
                }
                _ => {
                    diagnostics.push(Diagnostic::for_file(
                        DiagnosticKind::UnresolvableRange,
                        &fc.path,
                        format!("function {key} ('{}') has no stable original range", meta.name),
                    ));
                    leftover.fn_map.insert(key.clone(), meta.clone());
                    leftover.f.insert(key.clone(), hits);
                }
            }
        }

        // ── Branches ──────────────────────────────────────────────────
        for (key, meta) in &fc.branch_map {
            let hits = fc.b.get(key).cloned().unwrap_or_default();
            match self.remap_branch(doc, meta, &hits) {
                Some((source, loc, locations, mapped_hits)) => {
                    changes += 1;
                    bucket_for(buckets, &source, track_lines).add_branch(
                        meta.branch_type.clone(),
                        loc,
                        locations,
                        mapped_hits,
                    );
                }
                None => {
                    diagnostics.push(Diagnostic::for_file(
                        DiagnosticKind::UnresolvableRange,
                        &fc.path,
                        format!("branch {key} has no stable original range"),
                    ));
                    leftover.branch_map.insert(key.clone(), meta.clone());
                    leftover.b.insert(key.clone(), hits);
                }
            }
        }

        if changes == 0 && !fc.statement_map.is_empty() {
            debug!(file = %fc.path, "nothing could be mapped");
        }

        let empty = leftover.statement_map.is_empty()
            && leftover.fn_map.is_empty()
            && leftover.branch_map.is_empty();
        (!empty).then_some(leftover)
    }

    /// Remap a branch: the overall location plus every arm independently.
    /// Arms on different original lines are expected; arms in different
    /// original files make the branch unmappable as a unit.
    #[allow(clippy::type_complexity)]
    fn remap_branch(
        &self,
        doc: &DecodedMap,
        meta: &crate::model::BranchMeta,
        hits: &[u64],
    ) -> Option<(String, Location, Vec<Location>, Vec<u64>)> {
        let mut source: Option<String> = None;
        let mut locations = Vec::with_capacity(meta.locations.len());
        let mut mapped_hits = Vec::with_capacity(meta.locations.len());
        let mut first_mapped: Option<Location> = None;
        let mut any_mapped = false;

        for (i, arm) in meta.locations.iter().enumerate() {
            let count = hits.get(i).copied().unwrap_or(0);
            match map_location(doc, *arm) {
                Some(mapped) => {
                    match &source {
                        Some(s) if *s != mapped.source => return None,
                        Some(_) => {}
                        None => source = Some(mapped.source.clone()),
                    }
                    first_mapped.get_or_insert(mapped.loc);
                    locations.push(mapped.loc);
                    mapped_hits.push(count);
                    any_mapped = true;
                }
                None => {
                    // Degraded arm: generated coordinates, count per policy.
                    locations.push(*arm);
                    mapped_hits.push(match self.config.unmapped_arms {
                        UnmappedArmPolicy::Zero => 0,
                        UnmappedArmPolicy::Keep => count,
                    });
                }
            }
        }

        if !any_mapped {
            return None;
        }
        let source = source?;

        // The overall location falls back to the first mapped arm when it
        // cannot be remapped itself (or lands in another file).
        let overall = map_location(doc, meta.loc)
            .filter(|m| m.source == source)
            .map(|m| m.loc)
            .or(first_mapped)?;

        Some((source, overall, locations, mapped_hits))
    }
}

/// One-shot transform with a throwaway cache.
pub fn transform_coverage(coverage: CoverageMap, config: RemapConfig) -> TransformOutcome {
    Remapper::new(config).transform(coverage)
}
