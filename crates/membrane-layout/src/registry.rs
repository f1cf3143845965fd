//! Layout registry
//!
//! Layouts are looked up by name case-insensitively, so registration
//! rejects names that collide after folding. The canonical spelling is
//! whatever the layout itself declares.

use std::collections::HashMap;
use std::sync::Arc;

use crate::layout::StructLayout;
use crate::LayoutError;

/// Name-indexed collection of frozen layouts.
#[derive(Clone, Debug, Default)]
pub struct LayoutRegistry {
    by_name: HashMap<String, Arc<StructLayout>>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a layout under its own name.
    pub fn register(&mut self, layout: Arc<StructLayout>) -> Result<(), LayoutError> {
        let key = layout.name().to_lowercase();
        if self.by_name.contains_key(&key) {
            return Err(LayoutError::NameCollision {
                name: layout.name().to_string(),
            });
        }
        self.by_name.insert(key, layout);
        Ok(())
    }

    /// Look up a layout, ignoring case.
    pub fn get(&self, name: &str) -> Option<&Arc<StructLayout>> {
        self.by_name.get(&name.to_lowercase())
    }

    /// Number of registered layouts.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
