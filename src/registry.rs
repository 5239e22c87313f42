//! Transformer Registry
//!
//! Holds every known transformer engine, keyed by id. The registry is built
//! once at startup from the built-in engines plus any plugin descriptors, and
//! is only read after that point.

use std::collections::HashMap;
use std::sync::Arc;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::builtin;
use crate::error::RegistryError;
use crate::transformer::TransformerDescriptor;

/// Append-only set of transformer descriptors
#[derive(Debug, Default)]
pub struct TransformerRegistry {
    descriptors: HashMap<String, Arc<TransformerDescriptor>>,
}

impl TransformerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in engines
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin::descriptors() {
            let registered = registry.register(descriptor);
            debug_assert!(registered.is_ok(), "{:?}", registered);
            if let Err(err) = registered {
                tracing::error!(error = %err, "built-in transformer not registered");
            }
        }
        registry
    }

    /// Built-in engines plus externally supplied plugin descriptors.
    ///
    /// Fails on the first plugin whose id is already taken.
    pub fn from_plugins(
        plugins: impl IntoIterator<Item = TransformerDescriptor>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::with_builtins();
        for plugin in plugins {
            registry.register(plugin)?;
        }
        Ok(registry)
    }

    /// Register a descriptor.
    ///
    /// Existing ids cannot be replaced: the first registration is kept.
    pub fn register(&mut self, descriptor: TransformerDescriptor) -> Result<(), RegistryError> {
        if self.descriptors.contains_key(descriptor.id()) {
            return Err(RegistryError::DuplicateTransformerId {
                id: descriptor.id().to_string(),
            });
        }

        tracing::debug!(transformer = descriptor.id(), "registered transformer");
        self.descriptors
            .insert(descriptor.id().to_string(), Arc::new(descriptor));
        Ok(())
    }

    /// Resolve an id to its descriptor
    pub fn resolve(&self, id: &str) -> Result<Arc<TransformerDescriptor>, RegistryError> {
        self.descriptors
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTransformerId {
                id: id.to_string(),
                suggestion: self.suggest(id),
            })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.descriptors.contains_key(id)
    }

    /// All registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.descriptors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// All descriptors, sorted by id
    pub fn descriptors(&self) -> Vec<&TransformerDescriptor> {
        let mut descriptors: Vec<_> = self.descriptors.values().map(Arc::as_ref).collect();
        descriptors.sort_by(|a, b| a.id().cmp(b.id()));
        descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Closest registered id to an unknown one
    fn suggest(&self, id: &str) -> Option<String> {
        let matcher = SkimMatcherV2::default();
        let mut best: Option<(i64, &str)> = None;

        for candidate in self.descriptors.keys() {
            let score = matcher
                .fuzzy_match(candidate, id)
                .or_else(|| matcher.fuzzy_match(id, candidate));
            if let Some(score) = score {
                let better = match best {
                    Some((best_score, best_id)) => {
                        score > best_score || (score == best_score && candidate.as_str() < best_id)
                    }
                    None => true,
                };
                if better {
                    best = Some((score, candidate));
                }
            }
        }

        best.map(|(_, id)| id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::FnTransformer;

    fn descriptor(id: &str, marker: &'static str) -> TransformerDescriptor {
        TransformerDescriptor::new(id, move |_ctx| {
            Ok(Box::new(FnTransformer(move |content: &str| {
                Ok::<_, crate::error::TransformError>(format!("{}{}", marker, content))
            })))
        })
    }

    #[test]
    fn test_create_registry() {
        let registry = TransformerRegistry::new();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_with_builtins() {
        let registry = TransformerRegistry::with_builtins();
        assert!(registry.contains("banner"));
        assert!(registry.contains("define"));
        assert!(registry.contains("strip-comments"));
    }

    #[test]
    fn test_builtin_ids_distinct() {
        let registry = TransformerRegistry::with_builtins();
        assert_eq!(registry.len(), builtin::descriptors().len());
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let mut registry = TransformerRegistry::new();
        registry.register(descriptor("syntax", "first:")).unwrap();

        let result = registry.register(descriptor("syntax", "second:"));
        assert_eq!(
            result,
            Err(RegistryError::DuplicateTransformerId {
                id: "syntax".to_string()
            })
        );
        assert_eq!(registry.len(), 1);

        let kept = registry.resolve("syntax").unwrap();
        let config = crate::config::BundlessConfig::new("esm", "src", "dist");
        let options = crate::schema::ValidatedOptions::empty();
        let instance = kept
            .instantiate(&crate::transformer::TransformerContext {
                target: "esm",
                options: &options,
                config: &config,
            })
            .unwrap();
        assert_eq!(instance.process("x").unwrap(), "first:x");
    }

    #[test]
    fn test_plugin_clashing_with_builtin() {
        let result = TransformerRegistry::from_plugins(vec![descriptor("banner", "")]);
        assert!(matches!(
            result,
            Err(RegistryError::DuplicateTransformerId { .. })
        ));
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = TransformerRegistry::with_builtins();
        match registry.resolve("unknownEngine") {
            Err(RegistryError::UnknownTransformerId { id, .. }) => assert_eq!(id, "unknownEngine"),
            other => panic!("Expected UnknownTransformerId, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_suggests_close_id() {
        let registry = TransformerRegistry::with_builtins();
        match registry.resolve("banr") {
            Err(RegistryError::UnknownTransformerId { suggestion, .. }) => {
                assert_eq!(suggestion.as_deref(), Some("banner"));
            }
            other => panic!("Expected UnknownTransformerId, got {:?}", other),
        }
    }

    #[test]
    fn test_ids_sorted() {
        let mut registry = TransformerRegistry::new();
        registry.register(descriptor("zeta", "")).unwrap();
        registry.register(descriptor("alpha", "")).unwrap();
        assert_eq!(registry.ids(), vec!["alpha", "zeta"]);
    }
}
