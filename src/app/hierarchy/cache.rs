use std::collections::HashMap;
use std::sync::Mutex;

use crate::app::models::HierarchyTree;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedHierarchy {
    pub tree: HierarchyTree,
    pub captured_at: String,
}

/// Last good tree per logical display. No expiry; the session clears it on device switch.
#[derive(Default)]
pub struct HierarchyCache {
    entries: Mutex<HashMap<String, CachedHierarchy>>,
}

impl HierarchyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, display_id: &str) -> Option<CachedHierarchy> {
        self.entries
            .lock()
            .ok()
            .and_then(|guard| guard.get(display_id).cloned())
    }

    pub fn put(&self, display_id: &str, tree: HierarchyTree, captured_at: String) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.insert(display_id.to_string(), CachedHierarchy { tree, captured_at });
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
