//! Capability-indexed policy factories.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ports::policy::{PolicyFactory, PolicyKind};

/// Maps each supported [`PolicyKind`] to the factory that loads it.
///
/// Kinds with no registered factory are rejected at session creation.
#[derive(Clone, Default)]
pub struct PolicyCatalog {
    factories: BTreeMap<PolicyKind, Arc<dyn PolicyFactory>>,
}

impl PolicyCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, kind: PolicyKind, factory: Arc<dyn PolicyFactory>) -> Self {
        let _ = self.register(kind, factory);
        self
    }

    /// Register a factory, returning the one it replaced.
    pub fn register(
        &mut self,
        kind: PolicyKind,
        factory: Arc<dyn PolicyFactory>,
    ) -> Option<Arc<dyn PolicyFactory>> {
        self.factories.insert(kind, factory)
    }

    /// Factory for `kind`, if registered.
    pub fn get(&self, kind: PolicyKind) -> Option<Arc<dyn PolicyFactory>> {
        self.factories.get(&kind).cloned()
    }

    /// Whether `kind` can be loaded.
    pub fn contains(&self, kind: PolicyKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Registered kinds in stable order.
    pub fn kinds(&self) -> Vec<PolicyKind> {
        self.factories.keys().copied().collect()
    }

    /// Registered kinds as a comma-separated list.
    pub fn describe(&self) -> String {
        self.factories
            .keys()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Debug for PolicyCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyCatalog")
            .field("kinds", &self.kinds())
            .finish()
    }
}
