//! Locates the source map for each generated file in a coverage report and
//! attaches it as `inputSourceMap`, so the remap core never touches disk.
//!
//! Resolution order under `auto`: an already-embedded map wins, then a
//! `sourceMappingURL` reference in the generated file (inline data URI or
//! relative path), then an adjacent `<file>.map`, then `--map-dir`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use base64::Engine;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{CovmapError, Result};
use crate::model::{CoverageMap, SourceMap};

/// Matches `//# sourceMappingURL=...` (or the legacy `//@` form) on its own
/// line, as emitted at the tail of generated bundles.
static MAPPING_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^//[#@]\s*sourceMappingURL=(\S+)\s*$").unwrap());

/// Where to look for source maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapMode {
    /// Only `inputSourceMap` objects already embedded in the report.
    Embedded,
    /// The generated file's `sourceMappingURL` comment or its adjacent
    /// `<file>.map`.
    Adjacent,
    /// `<map-dir>/<file-name>.map`.
    Dir,
    /// Embedded, then adjacent, then the map directory.
    #[default]
    Auto,
}

impl MapMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapMode::Embedded => "embedded",
            MapMode::Adjacent => "adjacent",
            MapMode::Dir => "dir",
            MapMode::Auto => "auto",
        }
    }
}

impl std::str::FromStr for MapMode {
    type Err = CovmapError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "embedded" => Ok(MapMode::Embedded),
            "adjacent" => Ok(MapMode::Adjacent),
            "dir" => Ok(MapMode::Dir),
            "auto" => Ok(MapMode::Auto),
            _ => Err(CovmapError::UnknownMapMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for MapMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolver {
    pub mode: MapMode,
    /// Directory searched in `dir` mode (and as the `auto` fallback).
    pub map_dir: Option<PathBuf>,
}

impl Resolver {
    pub fn new(mode: MapMode, map_dir: Option<PathBuf>) -> Self {
        Self { mode, map_dir }
    }

    /// Attach a map to every file in `coverage` that resolution can find
    /// one for. Files that stay bare are the remapper's concern, not ours.
    pub fn attach(&self, coverage: &mut CoverageMap) {
        for (path, fc) in coverage.iter_mut() {
            if fc.input_source_map.is_some() {
                continue;
            }
            if self.mode == MapMode::Embedded {
                continue;
            }
            match self.locate(Path::new(path)) {
                Some(map) => {
                    debug!(file = %path, "attached external source map");
                    fc.input_source_map = Some(map);
                }
                None => debug!(file = %path, "no external source map found"),
            }
        }
    }

    fn locate(&self, generated: &Path) -> Option<SourceMap> {
        if matches!(self.mode, MapMode::Adjacent | MapMode::Auto) {
            if let Some(map) = from_mapping_url(generated) {
                return Some(map);
            }
            if let Some(map) = read_map_file(&adjacent_map_path(generated)) {
                return Some(map);
            }
        }
        if matches!(self.mode, MapMode::Dir | MapMode::Auto) {
            if let (Some(dir), Some(name)) = (&self.map_dir, generated.file_name()) {
                let mut candidate = dir.join(name);
                candidate.as_mut_os_string().push(".map");
                return read_map_file(&candidate);
            }
        }
        None
    }
}

fn adjacent_map_path(generated: &Path) -> PathBuf {
    let mut path = generated.to_path_buf();
    path.as_mut_os_string().push(".map");
    path
}

fn read_map_file(path: &Path) -> Option<SourceMap> {
    let text = std::fs::read_to_string(path).ok()?;
    match parse_map(&text) {
        Ok(map) => Some(map),
        Err(e) => {
            warn!(map = %path.display(), error = %e, "ignoring unparsable source map");
            None
        }
    }
}

/// Follow a `sourceMappingURL` comment in the generated file, handling both
/// inline `data:` URIs and paths relative to the file.
fn from_mapping_url(generated: &Path) -> Option<SourceMap> {
    let text = std::fs::read_to_string(generated).ok()?;
    let url = MAPPING_URL_RE
        .captures_iter(&text)
        .last()?
        .get(1)?
        .as_str()
        .to_string();

    if let Some(encoded) = url
        .strip_prefix("data:application/json;base64,")
        .or_else(|| url.strip_prefix("data:application/json;charset=utf-8;base64,"))
    {
        return match decode_data_uri(encoded) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!(file = %generated.display(), error = %e, "ignoring bad inline source map");
                None
            }
        };
    }
    if url.starts_with("data:") || url.contains("://") {
        // Other data encodings and remote URLs are out of scope.
        return None;
    }

    let relative = generated.parent().unwrap_or(Path::new(".")).join(url);
    read_map_file(&relative)
}

fn decode_data_uri(encoded: &str) -> Result<SourceMap> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| CovmapError::InvalidSourceMap(format!("bad base64 payload: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| CovmapError::InvalidSourceMap(format!("map is not UTF-8: {e}")))?;
    parse_map(&text)
}

/// Parse source map JSON, tolerating the XSSI guard some emitters prepend.
pub fn parse_map(text: &str) -> Result<SourceMap> {
    let trimmed = text.trim_start();
    let trimmed = trimmed.strip_prefix(")]}'").unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix(")]}").unwrap_or(trimmed);
    serde_json::from_str(trimmed.trim_start())
        .map_err(|e| CovmapError::InvalidSourceMap(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileCoverage;

    const MAP_JSON: &str = r#"{
        "version": 3,
        "sources": ["src/app.ts"],
        "names": [],
        "mappings": "AAAA"
    }"#;

    #[test]
    fn test_map_mode_from_str() {
        assert_eq!("embedded".parse::<MapMode>().unwrap(), MapMode::Embedded);
        assert_eq!("AUTO".parse::<MapMode>().unwrap(), MapMode::Auto);
        assert!("nearby".parse::<MapMode>().is_err());
    }

    #[test]
    fn test_parse_map_with_xssi_guard() {
        let guarded = format!(")]}}'\n{MAP_JSON}");
        let map = parse_map(&guarded).unwrap();
        assert_eq!(map.sources, vec!["src/app.ts"]);
    }

    #[test]
    fn test_attach_adjacent_map_file() {
        let dir = tempfile::tempdir().unwrap();
        let js = dir.path().join("app.js");
        std::fs::write(&js, "var x = 1;\n").unwrap();
        std::fs::write(dir.path().join("app.js.map"), MAP_JSON).unwrap();

        let mut coverage = CoverageMap::new();
        let key = js.to_string_lossy().to_string();
        coverage.insert(key.clone(), FileCoverage::new(key.clone()));

        Resolver::new(MapMode::Adjacent, None).attach(&mut coverage);
        let map = coverage[&key].input_source_map.as_ref().unwrap();
        assert_eq!(map.sources, vec!["src/app.ts"]);
    }

    #[test]
    fn test_attach_via_mapping_url_comment() {
        let dir = tempfile::tempdir().unwrap();
        let js = dir.path().join("app.js");
        std::fs::write(&js, "var x = 1;\n//# sourceMappingURL=maps/app.js.map\n").unwrap();
        std::fs::create_dir(dir.path().join("maps")).unwrap();
        std::fs::write(dir.path().join("maps/app.js.map"), MAP_JSON).unwrap();

        let mut coverage = CoverageMap::new();
        let key = js.to_string_lossy().to_string();
        coverage.insert(key.clone(), FileCoverage::new(key.clone()));

        Resolver::new(MapMode::Adjacent, None).attach(&mut coverage);
        assert!(coverage[&key].input_source_map.is_some());
    }

    #[test]
    fn test_attach_via_data_uri() {
        let dir = tempfile::tempdir().unwrap();
        let js = dir.path().join("app.js");
        let encoded = base64::engine::general_purpose::STANDARD.encode(MAP_JSON);
        std::fs::write(
            &js,
            format!("var x = 1;\n//# sourceMappingURL=data:application/json;base64,{encoded}\n"),
        )
        .unwrap();

        let mut coverage = CoverageMap::new();
        let key = js.to_string_lossy().to_string();
        coverage.insert(key.clone(), FileCoverage::new(key.clone()));

        Resolver::new(MapMode::Auto, None).attach(&mut coverage);
        let map = coverage[&key].input_source_map.as_ref().unwrap();
        assert_eq!(map.sources, vec!["src/app.ts"]);
    }

    #[test]
    fn test_attach_from_map_dir() {
        let dir = tempfile::tempdir().unwrap();
        let maps = dir.path().join("maps");
        std::fs::create_dir(&maps).unwrap();
        std::fs::write(maps.join("app.js.map"), MAP_JSON).unwrap();

        let mut coverage = CoverageMap::new();
        coverage.insert(
            "dist/app.js".to_string(),
            FileCoverage::new("dist/app.js".to_string()),
        );

        Resolver::new(MapMode::Dir, Some(maps)).attach(&mut coverage);
        assert!(coverage["dist/app.js"].input_source_map.is_some());
    }

    #[test]
    fn test_embedded_mode_does_no_io() {
        let mut coverage = CoverageMap::new();
        coverage.insert(
            "dist/app.js".to_string(),
            FileCoverage::new("dist/app.js".to_string()),
        );
        Resolver::new(MapMode::Embedded, None).attach(&mut coverage);
        assert!(coverage["dist/app.js"].input_source_map.is_none());
    }

    #[test]
    fn test_embedded_map_wins_over_adjacent() {
        let dir = tempfile::tempdir().unwrap();
        let js = dir.path().join("app.js");
        std::fs::write(&js, "var x = 1;\n").unwrap();
        std::fs::write(dir.path().join("app.js.map"), MAP_JSON).unwrap();

        let key = js.to_string_lossy().to_string();
        let mut fc = FileCoverage::new(key.clone());
        let mut embedded = parse_map(MAP_JSON).unwrap();
        embedded.sources = vec!["src/other.ts".to_string()];
        fc.input_source_map = Some(embedded);

        let mut coverage = CoverageMap::new();
        coverage.insert(key.clone(), fc);

        Resolver::new(MapMode::Auto, None).attach(&mut coverage);
        let map = coverage[&key].input_source_map.as_ref().unwrap();
        assert_eq!(map.sources, vec!["src/other.ts"]);
    }
}
