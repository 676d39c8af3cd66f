//! # Controller Registry
//!
//! Routes an operation type to its [`JobController`].
//!
//! Controllers are registered explicitly at startup as plain constructor functions
//! and the registry is shared by `Arc`, so there is no global state and no runtime
//! lookup by name beyond this table. Constructed controllers are cached; since
//! controllers are stateless, building a fresh one per call would be equally
//! correct.
//!
//! ## Usage
//!
//! ```rust
//! use geoflow_core::registry::ControllerRegistry;
//!
//! let registry = ControllerRegistry::with_default_controllers();
//! let controller = registry.get_controller("hello_world").unwrap();
//! assert_eq!(controller.job_type(), "hello_world");
//! assert!(registry.get_controller("reproject_raster").is_err());
//! ```

use crate::controllers;
use crate::error::{GeoflowError, Result};
use crate::orchestration::controller::JobController;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Constructor for one controller type
pub type ControllerFactory = fn() -> Arc<dyn JobController>;

#[derive(Default)]
pub struct ControllerRegistry {
    factories: BTreeMap<String, ControllerFactory>,
    cache: DashMap<String, Arc<dyn JobController>>,
}

impl ControllerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in controller registered
    pub fn with_default_controllers() -> Self {
        let mut registry = Self::new();
        controllers::register_defaults(&mut registry);
        registry
    }

    /// Register (or replace) the factory for an operation type
    pub fn register(&mut self, operation_type: impl Into<String>, factory: ControllerFactory) -> &mut Self {
        let operation_type = operation_type.into();
        self.cache.remove(&operation_type);
        self.factories.insert(operation_type, factory);
        self
    }

    /// Resolve the controller for an operation type
    pub fn get_controller(&self, operation_type: &str) -> Result<Arc<dyn JobController>> {
        if let Some(controller) = self.cache.get(operation_type) {
            return Ok(controller.clone());
        }

        let factory =
            self.factories
                .get(operation_type)
                .ok_or_else(|| GeoflowError::ControllerNotFound {
                    operation_type: operation_type.to_string(),
                    available: self.operation_types(),
                })?;

        let controller = factory();
        debug!(operation_type, "Constructed controller");
        self.cache
            .insert(operation_type.to_string(), controller.clone());
        Ok(controller)
    }

    pub fn contains(&self, operation_type: &str) -> bool {
        self.factories.contains_key(operation_type)
    }

    /// Registered operation types, sorted
    pub fn operation_types(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn cache_stats(&self) -> ControllerCacheStats {
        let mut cache_keys: Vec<String> = self.cache.iter().map(|e| e.key().clone()).collect();
        cache_keys.sort();
        ControllerCacheStats {
            registered_controllers: self.factories.len(),
            cached_controllers: cache_keys.len(),
            cache_keys,
        }
    }
}

impl std::fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field("operation_types", &self.operation_types())
            .field("cached", &self.cache.len())
            .finish()
    }
}

/// Statistics about the controller cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerCacheStats {
    pub registered_controllers: usize,
    pub cached_controllers: usize,
    pub cache_keys: Vec<String>,
}
