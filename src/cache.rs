//! Decoded source maps and an explicit cache over them.
//!
//! Decoding a mapping string is the expensive part of a remap pass, so
//! repeated invocations against the same map go through a cache keyed by a
//! content fingerprint. The cache is an owned object passed to or held by
//! the pipeline, never process-global, and supports explicit invalidation.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::decoder::decode_mappings;
use crate::diag::Diagnostic;
use crate::index::PositionIndex;
use crate::model::SourceMap;

/// A source map decoded into queryable form. Read-only once built, so it is
/// shared via `Arc` between the cache and any number of remap passes.
#[derive(Debug)]
pub struct DecodedMap {
    /// Source paths with `sourceRoot` already applied.
    pub sources: Vec<String>,
    pub index: PositionIndex,
    /// Warnings produced while decoding the mapping string.
    pub diagnostics: Vec<Diagnostic>,
}

impl DecodedMap {
    pub fn decode(map: &SourceMap) -> Self {
        let decoded = decode_mappings(&map.mappings, map.sources.len(), map.names.len());
        let sources = (0..map.sources.len())
            .map(|i| map.resolved_source(i).unwrap_or_default())
            .collect();
        Self {
            sources,
            index: PositionIndex::from_segments(decoded.segments),
            diagnostics: decoded.diagnostics,
        }
    }
}

#[derive(Debug, Default)]
pub struct SourceMapCache {
    entries: HashMap<u64, Arc<DecodedMap>>,
}

impl SourceMapCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity of a map for caching purposes: the mapping data plus the
    /// tables that affect decoding.
    pub fn fingerprint(map: &SourceMap) -> u64 {
        let mut hasher = DefaultHasher::new();
        map.mappings.hash(&mut hasher);
        map.sources.hash(&mut hasher);
        map.source_root.hash(&mut hasher);
        map.names.hash(&mut hasher);
        hasher.finish()
    }

    pub fn get_or_decode(&mut self, map: &SourceMap) -> Arc<DecodedMap> {
        let key = Self::fingerprint(map);
        self.entries
            .entry(key)
            .or_insert_with(|| Arc::new(DecodedMap::decode(map)))
            .clone()
    }

    /// Drop the cached entry for `map`, if present.
    pub fn invalidate(&mut self, map: &SourceMap) -> bool {
        self.entries.remove(&Self::fingerprint(map)).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map(mappings: &str) -> SourceMap {
        SourceMap {
            version: 3,
            sources: vec!["src/app.ts".to_string()],
            names: vec![],
            mappings: mappings.to_string(),
            file: Some("app.js".to_string()),
            source_root: None,
            sources_content: None,
        }
    }

    #[test]
    fn test_decode_applies_source_root() {
        let mut map = sample_map("AAAA");
        map.source_root = Some("packages/web".to_string());
        let decoded = DecodedMap::decode(&map);
        assert_eq!(decoded.sources, vec!["packages/web/src/app.ts"]);
    }

    #[test]
    fn test_cache_reuses_decoded_entry() {
        let mut cache = SourceMapCache::new();
        let map = sample_map("AAAA,SAAA");

        let a = cache.get_or_decode(&map);
        let b = cache.get_or_decode(&map);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_distinguishes_different_maps() {
        let mut cache = SourceMapCache::new();
        let a = cache.get_or_decode(&sample_map("AAAA"));
        let b = cache.get_or_decode(&sample_map("AACA"));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let mut cache = SourceMapCache::new();
        let map = sample_map("AAAA");
        cache.get_or_decode(&map);

        assert!(cache.invalidate(&map));
        assert!(!cache.invalidate(&map));
        assert!(cache.is_empty());

        cache.get_or_decode(&map);
        cache.clear();
        assert!(cache.is_empty());
    }
}
