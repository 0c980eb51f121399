//! Content-addressed cache of resolved regions
//!
//! Keys are SHA-256 digests of the canonical JSON form of a [`RegionSpec`]
//! together with the identity and extent of the bound sheet and the variables
//! bound in the context, so a qualifier region written in terms of `$row` is
//! cached per statement row. The cache is owned by a generation session and
//! shared across worker threads.

use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{Region, RegionError, RegionSpec};
use crate::expr::EvaluationContext;

#[derive(Debug, Default)]
pub struct RegionCache {
    entries: DashMap<String, Arc<Region>>,
}

impl RegionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for `spec` resolved in `ctx`
    pub fn key(spec: &RegionSpec, ctx: &EvaluationContext<'_>) -> String {
        let sheet = ctx.sheet;
        let mut hasher = Sha256::new();
        // Serializing a plain struct of strings and integers cannot fail
        let canonical = serde_json::to_string(spec).unwrap_or_else(|_| format!("{:?}", spec));
        hasher.update(canonical.as_bytes());
        hasher.update(b"\0");
        hasher.update(sheet.source_file_name().as_bytes());
        hasher.update(b"\0");
        hasher.update(sheet.name().as_bytes());
        hasher.update(format!("\0{}x{}", sheet.row_len(), sheet.col_len()).as_bytes());
        hasher.update(format!("\0{:?}", ctx.vars).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Resolve `spec`, reusing an earlier result for the same spec and sheet
    pub fn resolve(
        &self,
        spec: &RegionSpec,
        ctx: &EvaluationContext<'_>,
    ) -> Result<Arc<Region>, RegionError> {
        let key = Self::key(spec, ctx);
        if let Some(hit) = self.entries.get(&key) {
            debug!(key = %&key[..12], "region cache hit");
            return Ok(Arc::clone(hit.value()));
        }
        debug!(key = %&key[..12], "region cache miss");
        let region = Arc::new(spec.resolve(ctx)?);
        // Concurrent resolvers of the same key produce equal regions; first insert wins
        let entry = self.entries.entry(key).or_insert(region);
        Ok(Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
