//! Decodes a source map `mappings` string into an ordered segment list.
//!
//! The string is a `;`-separated sequence of per-generated-line groups, each
//! a `,`-separated sequence of VLQ segments. Generated columns are deltas
//! that reset at every line; source index, original line/column, and name
//! index are deltas that accumulate across the whole document.
//!
//! Malformed segments are skipped one at a time with a diagnostic; sibling
//! segments in the same group still decode, and the delta accumulators are
//! left as they were before the bad segment.

use tracing::debug;

use crate::diag::{Diagnostic, DiagnosticKind};
use crate::vlq;

/// One mapping: a generated position, optionally tied to an original one.
///
/// A segment without `original` is a valid marker that terminates the
/// effective range of the previous segment on the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub generated_line: u32,
    pub generated_column: u32,
    pub original: Option<OriginalRef>,
}

/// Original-side fields of a segment, as indexes into the map's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalRef {
    pub source: u32,
    pub line: u32,
    pub column: u32,
    pub name: Option<u32>,
}

/// Result of decoding a full `mappings` string.
#[derive(Debug, Default)]
pub struct DecodedMappings {
    /// Sorted by (generated_line, generated_column).
    pub segments: Vec<Segment>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Delta accumulators carried across segments.
#[derive(Clone, Copy, Default)]
struct DecodeState {
    generated_column: i64,
    source: i64,
    original_line: i64,
    original_column: i64,
    name: i64,
}

/// Decode `mappings`, validating source indexes against `source_count` and
/// name indexes against `name_count`.
pub fn decode_mappings(mappings: &str, source_count: usize, name_count: usize) -> DecodedMappings {
    let mut out = DecodedMappings::default();
    let mut state = DecodeState::default();

    for (line_index, group) in mappings.split(';').enumerate() {
        state.generated_column = 0;
        let line_start = out.segments.len();
        let mut ordered = true;

        for raw in group.split(',') {
            if raw.is_empty() {
                continue;
            }
            let before = state;
            match decode_segment(raw, line_index as u32, &mut state, source_count, name_count) {
                Ok(segment) => {
                    if let Some(last) = out.segments.last() {
                        if last.generated_line == segment.generated_line
                            && last.generated_column > segment.generated_column
                        {
                            ordered = false;
                        }
                    }
                    out.segments.push(segment);
                }
                Err(reason) => {
                    state = before;
                    debug!(line = line_index, segment = raw, %reason, "skipping segment");
                    out.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::MalformedMapping,
                        format!("line {line_index}, segment '{raw}': {reason}"),
                    ));
                }
            }
        }

        // Some encoders emit out-of-order columns; the index requires the
        // sorted invariant, so restore it here.
        if !ordered {
            out.segments[line_start..].sort_by_key(|s| s.generated_column);
        }
    }

    out
}

fn decode_segment(
    raw: &str,
    line: u32,
    state: &mut DecodeState,
    source_count: usize,
    name_count: usize,
) -> Result<Segment, String> {
    let bytes = raw.as_bytes();
    let mut cursor = 0;

    let delta = vlq::decode(bytes, &mut cursor).map_err(|e| e.to_string())?;
    let generated_column = state.generated_column + delta;
    if generated_column < 0 {
        return Err(format!("generated column underflows to {generated_column}"));
    }

    if cursor == bytes.len() {
        state.generated_column = generated_column;
        return Ok(Segment {
            generated_line: line,
            generated_column: generated_column as u32,
            original: None,
        });
    }

    let source = state.source + vlq::decode(bytes, &mut cursor).map_err(|e| e.to_string())?;
    let original_line =
        state.original_line + vlq::decode(bytes, &mut cursor).map_err(|e| e.to_string())?;
    let original_column =
        state.original_column + vlq::decode(bytes, &mut cursor).map_err(|e| e.to_string())?;

    if source < 0 || source as usize >= source_count {
        return Err(format!("source index {source} out of range"));
    }
    if original_line < 0 || original_column < 0 {
        return Err(format!(
            "original position underflows to {original_line}:{original_column}"
        ));
    }

    let mut name = None;
    if cursor < bytes.len() {
        let name_index = state.name + vlq::decode(bytes, &mut cursor).map_err(|e| e.to_string())?;
        if cursor != bytes.len() {
            return Err("trailing data after name field".to_string());
        }
        state.name = name_index;
        // An out-of-range name loses only the name, not the mapping.
        if name_index >= 0 && (name_index as usize) < name_count {
            name = Some(name_index as u32);
        }
    }

    state.generated_column = generated_column;
    state.source = source;
    state.original_line = original_line;
    state.original_column = original_column;

    Ok(Segment {
        generated_line: line,
        generated_column: generated_column as u32,
        original: Some(OriginalRef {
            source: source as u32,
            line: original_line as u32,
            column: original_column as u32,
            name,
        }),
    })
}
