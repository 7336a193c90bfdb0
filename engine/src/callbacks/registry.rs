//! Boot-time callback routing table
//!
//! Modules declare the callback ids they handle once, when the orchestrator
//! is built. A resolved ledger entry whose id no module claimed is dropped
//! with a warning instead of being dispatched.

use crate::callbacks::ledger::LedgerError;
use std::collections::BTreeMap;

/// Callback ids handled by one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleCallbacks {
    pub module: &'static str,
    pub callback_ids: Vec<&'static str>,
}

impl ModuleCallbacks {
    pub fn new(module: &'static str, callback_ids: &[&'static str]) -> Self {
        Self {
            module,
            callback_ids: callback_ids.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallbackRegistry {
    routes: BTreeMap<&'static str, &'static str>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every module's ids, or none of them on a collision
    pub fn set_callback_handlers(&mut self, modules: &[ModuleCallbacks]) -> Result<(), LedgerError> {
        let mut routes = self.routes.clone();
        for module in modules {
            for id in &module.callback_ids {
                if routes.insert(*id, module.module).is_some() {
                    return Err(LedgerError::DuplicateCallbackId(id.to_string()));
                }
            }
        }
        self.routes = routes;
        Ok(())
    }

    pub fn module_for(&self, callback_id: &str) -> Option<&'static str> {
        self.routes.get(callback_id).copied()
    }

    pub fn is_registered(&self, callback_id: &str) -> bool {
        self.routes.contains_key(callback_id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_registers_nothing() {
        let mut registry = CallbackRegistry::new();
        let result = registry.set_callback_handlers(&[
            ModuleCallbacks::new("stakeibc", &["delegate", "undelegate"]),
            ModuleCallbacks::new("other", &["delegate"]),
        ]);
        assert!(matches!(result, Err(LedgerError::DuplicateCallbackId(id)) if id == "delegate"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_collision_with_existing_route() {
        let mut registry = CallbackRegistry::new();
        registry
            .set_callback_handlers(&[ModuleCallbacks::new("stakeibc", &["sweep"])])
            .unwrap();
        assert!(registry
            .set_callback_handlers(&[ModuleCallbacks::new("other", &["sweep"])])
            .is_err());
        assert_eq!(registry.module_for("sweep"), Some("stakeibc"));
    }
}
