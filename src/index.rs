//! Position index over decoded mapping segments.
//!
//! All segments live in one contiguous arena sorted by (generated line,
//! generated column); each mapped line is a slice into that arena, and the
//! line table itself is sorted for binary search. Built once per document,
//! read-only afterwards.

use crate::decoder::{DecodedMappings, Segment};

#[derive(Debug, Clone, Copy)]
struct LineSpan {
    line: u32,
    start: usize,
    end: usize,
}

#[derive(Debug)]
pub struct PositionIndex {
    segments: Vec<Segment>,
    lines: Vec<LineSpan>,
}

impl PositionIndex {
    pub fn new(decoded: DecodedMappings) -> Self {
        Self::from_segments(decoded.segments)
    }

    /// `segments` must be sorted by (generated_line, generated_column),
    /// which is what the decoder produces.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        let mut lines: Vec<LineSpan> = Vec::new();
        for (i, seg) in segments.iter().enumerate() {
            match lines.last_mut() {
                Some(span) if span.line == seg.generated_line => span.end = i + 1,
                _ => lines.push(LineSpan {
                    line: seg.generated_line,
                    start: i,
                    end: i + 1,
                }),
            }
        }
        Self { segments, lines }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments of one generated line; empty if the line has no mappings.
    pub fn line_segments(&self, line: u32) -> &[Segment] {
        match self.lines.binary_search_by_key(&line, |span| span.line) {
            Ok(i) => &self.segments[self.lines[i].start..self.lines[i].end],
            Err(_) => &[],
        }
    }

    /// The segment covering generated (line, column): the one with the
    /// greatest column ≤ `column` on exactly that line. Never falls back to
    /// another line; a miss here means the position is unmapped.
    pub fn lookup(&self, line: u32, column: u32) -> Option<&Segment> {
        let run = self.line_segments(line);
        let idx = run.partition_point(|s| s.generated_column <= column);
        idx.checked_sub(1).map(|i| &run[i])
    }

    /// Like [`lookup`](Self::lookup), but when `line` itself has no
    /// mappings, falls back to the last segment of the nearest preceding
    /// mapped line. Callers opt into this explicitly; exact lookup must not
    /// silently approximate across lines.
    pub fn lookup_nearest(&self, line: u32, column: u32) -> Option<&Segment> {
        let run = self.line_segments(line);
        if !run.is_empty() {
            // The line is mapped: column resolution is exact, even when it
            // misses (every segment starts past `column`).
            let idx = run.partition_point(|s| s.generated_column <= column);
            return idx.checked_sub(1).map(|i| &run[i]);
        }
        let idx = self.lines.partition_point(|span| span.line < line);
        let span = idx.checked_sub(1).map(|i| self.lines[i])?;
        self.segments[span.start..span.end].last()
    }

    /// Segments with generated position inside [start, end], inclusive on
    /// both endpoints. Positions are (line, column) pairs.
    pub fn segments_between(&self, start: (u32, u32), end: (u32, u32)) -> &[Segment] {
        let lo = self
            .segments
            .partition_point(|s| (s.generated_line, s.generated_column) < start);
        let hi = self
            .segments
            .partition_point(|s| (s.generated_line, s.generated_column) <= end);
        if lo <= hi {
            &self.segments[lo..hi]
        } else {
            &[]
        }
    }
}
