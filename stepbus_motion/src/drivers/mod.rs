//! Sink driver implementations and factory registry.
//!
//! Drivers are registered by name into a [`SinkRegistry`] at startup and
//! instantiated from configuration, keeping hardware backends pluggable.
//! [`builtin_registry`] returns a registry with everything this crate
//! ships.

mod simulation;

pub use simulation::{SimulationSink, WriteJournal};

use crate::error::MotionError;
use crate::sink::ShiftSink;
use std::collections::HashMap;

/// Factory function type for creating sink instances.
pub type SinkFactory = fn() -> Box<dyn ShiftSink>;

/// Registry of available sink drivers.
///
/// Constructed at startup, populated via `register()`, and consumed when
/// resolving the configured driver name. No global state, testable in
/// isolation.
pub struct SinkRegistry {
    factories: HashMap<&'static str, SinkFactory>,
}

impl SinkRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a sink factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: SinkFactory) {
        if self.factories.contains_key(name) {
            panic!("Sink driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Create a sink instance by name.
    ///
    /// # Errors
    /// Returns `MotionError::DriverNotFound` if no driver with the given
    /// name is registered.
    pub fn create(&self, name: &str) -> Result<Box<dyn ShiftSink>, MotionError> {
        let factory = self
            .factories
            .get(name)
            .copied()
            .ok_or_else(|| MotionError::DriverNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// List all registered driver names.
    pub fn list(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a registry with all built-in sink drivers registered.
pub fn builtin_registry() -> SinkRegistry {
    let mut registry = SinkRegistry::new();
    registry.register("simulation", || Box::new(SimulationSink::new()));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_register_and_create() {
        let registry = builtin_registry();
        let sink = registry.create("simulation").expect("should create");
        assert_eq!(sink.name(), "simulation");
    }

    #[test]
    fn registry_driver_not_found() {
        let registry = SinkRegistry::new();
        assert!(matches!(
            registry.create("ethercat"),
            Err(MotionError::DriverNotFound(_))
        ));
    }

    #[test]
    fn registry_lists_builtin_drivers() {
        let registry = builtin_registry();
        assert_eq!(registry.list(), vec!["simulation"]);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn registry_duplicate_panics() {
        let mut registry = builtin_registry();
        registry.register("simulation", || Box::new(SimulationSink::new()));
    }
}
