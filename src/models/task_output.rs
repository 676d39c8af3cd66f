//! Typed task results.
//!
//! Task types the core knows about report one of the structured variants; anything
//! operation-specific travels as an opaque [`TaskOutput::Extension`] payload.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutput {
    /// A greeting produced by a `hello_world_greeting` task
    Greeting { index: u32, message: String },
    /// The single reply produced after all greetings of a sequential job
    Reply {
        greetings_received: usize,
        message: String,
    },
    /// Outcome of checking one source file before cataloging
    FileValidated {
        path: String,
        valid: bool,
        format: Option<String>,
        size_bytes: Option<u64>,
        reason: Option<String>,
    },
    /// A file registered as a catalog item
    ItemCatalogued {
        item_id: String,
        collection_id: String,
        path: String,
        format: String,
    },
    /// Operation-specific data the core does not interpret
    Extension { data: serde_json::Value },
}

impl TaskOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Greeting { .. } => "greeting",
            Self::Reply { .. } => "reply",
            Self::FileValidated { .. } => "file_validated",
            Self::ItemCatalogued { .. } => "item_catalogued",
            Self::Extension { .. } => "extension",
        }
    }
}
