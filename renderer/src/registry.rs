use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::program::CompiledTemplate;

/// Named compiled templates. Last write wins.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: RwLock<HashMap<String, Arc<CompiledTemplate>>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        TemplateRegistry::default()
    }

    /// Store `template` under `id`. Returns true when an entry was replaced.
    pub fn store(&self, id: &str, template: Arc<CompiledTemplate>) -> bool {
        let mut templates = self.templates.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = templates.insert(id.to_string(), template).is_some();
        if replaced {
            log::warn!("stored template '{}' overwritten due to id conflict", id);
        }
        replaced
    }

    pub fn get(&self, id: &str) -> Option<Arc<CompiledTemplate>> {
        let templates = self.templates.read().unwrap_or_else(PoisonError::into_inner);
        templates.get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<CompiledTemplate>> {
        let mut templates = self.templates.write().unwrap_or_else(PoisonError::into_inner);
        templates.remove(id)
    }

    /// Stored ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let templates = self.templates.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = templates.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.templates.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
