use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::enrichment::uppercase::Uppercase;
use crate::enrichment::Enrichment;

/// Process-scoped table of available enrichments, keyed by slug.
///
/// Populated once at startup and read-only afterwards: build it, register
/// everything, then share it behind an `Arc`. There is no global mutable
/// singleton.
pub struct EnrichmentRegistry {
    enrichments: HashMap<&'static str, Arc<dyn Enrichment>>,
}

impl EnrichmentRegistry {
    pub fn new() -> Self {
        Self {
            enrichments: HashMap::new(),
        }
    }

    /// Registry pre-loaded with the built-in enrichments
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Uppercase));
        registry
    }

    pub fn register(&mut self, enrichment: Arc<dyn Enrichment>) {
        let slug = enrichment.slug();
        if self.enrichments.insert(slug, enrichment).is_some() {
            warn!("Enrichment '{}' registered twice, keeping the later one", slug);
        } else {
            info!("Registered enrichment '{}'", slug);
        }
    }

    pub fn get(&self, slug: &str) -> Option<Arc<dyn Enrichment>> {
        self.enrichments.get(slug).cloned()
    }

    /// All registered enrichments, sorted by slug for stable listings
    pub fn all(&self) -> Vec<Arc<dyn Enrichment>> {
        let mut all: Vec<_> = self.enrichments.values().cloned().collect();
        all.sort_by_key(|e| e.slug());
        all
    }
}

impl Default for EnrichmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
