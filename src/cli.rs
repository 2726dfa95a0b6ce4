//! Command handler functions for the covmap CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout. Warnings travel alongside as
//! structured diagnostics; the caller decides where they go.

use std::fmt::Write;

use anyhow::Result;
use clap::ValueEnum;

use crate::diag::Diagnostic;
use crate::remap::{RemapConfig, UnmappedArmPolicy};
use crate::resolve::Resolver;
use crate::{cache, coverage, remap, resolve};

/// CLI face of [`UnmappedArmPolicy`].
#[derive(Clone, Copy, Default, ValueEnum)]
pub enum ArmStyle {
    /// Zero the count of a branch arm that fails to remap.
    Zero,
    /// Keep the arm's count at its generated location.
    #[default]
    Keep,
}

impl From<ArmStyle> for UnmappedArmPolicy {
    fn from(style: ArmStyle) -> Self {
        match style {
            ArmStyle::Zero => UnmappedArmPolicy::Zero,
            ArmStyle::Keep => UnmappedArmPolicy::Keep,
        }
    }
}

/// Remap a coverage report: parse, resolve maps, transform, serialize.
pub fn cmd_transform(
    input: &[u8],
    resolver: &Resolver,
    config: RemapConfig,
    pretty: bool,
) -> Result<(String, Vec<Diagnostic>)> {
    let parsed = coverage::parse(input)?;
    let mut diagnostics = parsed.diagnostics;

    let mut report = parsed.coverage;
    resolver.attach(&mut report);

    let outcome = remap::transform_coverage(report, config);
    diagnostics.extend(outcome.diagnostics);

    let json = coverage::to_json_string(&outcome.coverage, pretty)?;
    Ok((json, diagnostics))
}

/// Decode a source map and print what it contains.
pub fn cmd_inspect(map_text: &str) -> Result<String> {
    let map = resolve::parse_map(map_text)?;
    let decoded = cache::DecodedMap::decode(&map);

    let segments = decoded.index.segments();
    let total = segments.len();
    let markers = segments.iter().filter(|s| s.original.is_none()).count();
    let mapped_lines = {
        let mut lines: Vec<u32> = segments.iter().map(|s| s.generated_line).collect();
        lines.dedup();
        lines.len()
    };

    let mut out = String::new();
    writeln!(out, "Version:   {}", map.version).unwrap();
    if let Some(file) = &map.file {
        writeln!(out, "File:      {file}").unwrap();
    }
    writeln!(out, "Sources:   {}", map.sources.len()).unwrap();
    writeln!(out, "Names:     {}", map.names.len()).unwrap();
    writeln!(out, "Lines:     {mapped_lines} with mappings").unwrap();
    writeln!(out, "Segments:  {total} ({markers} without original position)").unwrap();
    if !decoded.diagnostics.is_empty() {
        writeln!(out, "Warnings:  {}", decoded.diagnostics.len()).unwrap();
    }

    if !decoded.sources.is_empty() {
        let mut counts = vec![0usize; decoded.sources.len()];
        for seg in segments {
            if let Some(orig) = seg.original {
                counts[orig.source as usize] += 1;
            }
        }

        writeln!(out).unwrap();
        writeln!(out, "{:<60} {:>8}", "SOURCE", "SEGMENTS").unwrap();
        writeln!(out, "{}", "-".repeat(70)).unwrap();
        for (source, count) in decoded.sources.iter().zip(&counts) {
            writeln!(out, "{source:<60} {count:>8}").unwrap();
        }
    }

    Ok(out)
}
