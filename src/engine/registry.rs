//! Resolved specs keyed by call site.
//!
//! Sites register once (typically at startup); lookups on the hot path are a
//! shard-local read. A key that was never registered is not instrumented.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::AutoLogConfig;

use super::spec::{CallSite, InstrumentationSpec};

#[derive(Debug, Default)]
pub struct SpecRegistry {
    specs: DashMap<String, Arc<InstrumentationSpec>>,
}

impl SpecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `site` against `config` and store it under [`CallSite::key`].
    ///
    /// Sites without attributes at either level are not instrumented and
    /// return `None`. Re-registering replaces the previous spec.
    pub fn register(&self, site: &CallSite, config: &AutoLogConfig) -> Option<Arc<InstrumentationSpec>> {
        if !site.is_annotated() {
            return None;
        }
        let spec = Arc::new(InstrumentationSpec::resolve(site, config));
        self.specs.insert(site.key(), spec.clone());
        Some(spec)
    }

    pub fn get(&self, key: &str) -> Option<Arc<InstrumentationSpec>> {
        self.specs.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &str) -> Option<Arc<InstrumentationSpec>> {
        self.specs.remove(key).map(|(_, spec)| spec)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.specs.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spec::AutoLogAttrs;

    #[test]
    fn unannotated_sites_are_not_registered() {
        let registry = SpecRegistry::new();
        let site = CallSite::new("app", "Svc", "plain");
        assert!(registry.register(&site, &AutoLogConfig::default()).is_none());
        assert!(registry.get("app::Svc::plain").is_none());
    }

    #[test]
    fn register_then_lookup() {
        let registry = SpecRegistry::new();
        let site = CallSite::new("app", "Svc", "run").method_attrs(AutoLogAttrs::new());
        registry.register(&site, &AutoLogConfig::default());
        let spec = registry.get("app::Svc::run").unwrap();
        assert_eq!(spec.method, "Svc.run");
        assert_eq!(registry.keys(), vec!["app::Svc::run"]);
        assert!(registry.remove("app::Svc::run").is_some());
        assert!(registry.is_empty());
    }
}
