pub mod cache;
pub mod cli;
pub mod coverage;
pub mod decoder;
pub mod diag;
pub mod error;
pub mod index;
pub mod model;
pub mod reconcile;
pub mod remap;
pub mod resolve;
pub mod vlq;

pub use model::{CoverageMap, FileCoverage, Location, Position, SourceMap};
pub use remap::{transform_coverage, RemapConfig, Remapper, TransformOutcome, UnmappedArmPolicy};

/// Remap a coverage report given as JSON text, using only source maps
/// embedded in the report. Returns the remapped JSON plus diagnostics.
pub fn transform_report(
    json: &str,
    config: RemapConfig,
) -> error::Result<(String, Vec<diag::Diagnostic>)> {
    let parsed = coverage::parse(json.as_bytes())?;
    let mut diagnostics = parsed.diagnostics;

    let outcome = transform_coverage(parsed.coverage, config);
    diagnostics.extend(outcome.diagnostics);

    let out = coverage::to_json_string(&outcome.coverage, true)?;
    Ok((out, diagnostics))
}
