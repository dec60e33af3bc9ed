//! Registry of the engines a bus routes into.

use indexmap::IndexMap;
use meridian_engine::{Engine, EngineSnapshot};

/// Engines addressable by name, kept in registration order. The cycle runs
/// them in exactly this order.
#[derive(Debug, Default)]
pub struct EngineFleet {
    engines: IndexMap<String, Engine>,
}

impl EngineFleet {
    /// Creates an empty fleet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an engine under its own name, replacing any engine
    /// already registered under that name.
    pub fn register(&mut self, engine: Engine) {
        self.engines.insert(engine.name().to_string(), engine);
    }

    /// Looks up an engine by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Engine> {
        self.engines.get(name)
    }

    /// Looks up an engine by name for mutation.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Engine> {
        self.engines.get_mut(name)
    }

    /// Whether an engine is registered under the name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.engines.contains_key(name)
    }

    /// Registered engine names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.engines.keys().cloned().collect()
    }

    /// Number of registered engines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Whether no engines are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Iterates engines in registration order.
    pub fn engines(&self) -> impl Iterator<Item = &Engine> {
        self.engines.values()
    }

    /// Iterates engines mutably in registration order.
    pub fn engines_mut(&mut self) -> impl Iterator<Item = &mut Engine> {
        self.engines.values_mut()
    }

    /// Status snapshots for every engine, in registration order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<EngineSnapshot> {
        self.engines.values().map(Engine::snapshot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(name: &str) -> Engine {
        Engine::builder(name).objective("test").build()
    }

    #[test]
    fn registration_order_is_preserved() {
        let mut fleet = EngineFleet::new();
        fleet.register(engine("marketing"));
        fleet.register(engine("commerce"));
        fleet.register(engine("operations"));
        assert_eq!(fleet.names(), vec!["marketing", "commerce", "operations"]);
    }

    #[test]
    fn reregistration_replaces_without_reordering() {
        let mut fleet = EngineFleet::new();
        fleet.register(engine("marketing"));
        fleet.register(engine("commerce"));
        fleet.register(engine("marketing"));
        assert_eq!(fleet.len(), 2);
        assert_eq!(fleet.names(), vec!["marketing", "commerce"]);
    }

    #[test]
    fn lookup_misses_return_none() {
        let fleet = EngineFleet::new();
        assert!(fleet.get("ghost").is_none());
        assert!(!fleet.contains("ghost"));
    }
}
