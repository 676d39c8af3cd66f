//! # Registry Infrastructure
//!
//! Lookup tables populated once at startup and shared by reference:
//!
//! ```text
//! Registries
//! ├── ControllerRegistry    (operation type -> job controller)
//! └── TaskHandlerRegistry   (task type -> worker handler, see crate::worker)
//! ```

pub mod controller_registry;

pub use controller_registry::{ControllerCacheStats, ControllerFactory, ControllerRegistry};
