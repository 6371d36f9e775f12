use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::error::Result;
use crate::traits::ActiveWork;

#[derive(Debug, Default)]
struct Inner {
    slotted: HashSet<String>,
    agents: HashSet<String>,
}

/// In-process record of live work, owned by a dispatcher embedding the engine.
///
/// Clones share state. Recovery only reads it through [`ActiveWork`].
#[derive(Debug, Clone, Default)]
pub struct ActivityRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the task already held a slot.
    pub fn claim_slot(&self, task_id: impl Into<String>) -> bool {
        self.inner.write().unwrap().slotted.insert(task_id.into())
    }

    pub fn release_slot(&self, task_id: &str) -> bool {
        self.inner.write().unwrap().slotted.remove(task_id)
    }

    pub fn register_agent(&self, task_id: impl Into<String>) -> bool {
        self.inner.write().unwrap().agents.insert(task_id.into())
    }

    pub fn unregister_agent(&self, task_id: &str) -> bool {
        self.inner.write().unwrap().agents.remove(task_id)
    }

    pub fn is_active(&self, task_id: &str) -> bool {
        let inner = self.inner.read().unwrap();
        inner.slotted.contains(task_id) || inner.agents.contains(task_id)
    }

    pub fn slot_count(&self) -> usize {
        self.inner.read().unwrap().slotted.len()
    }
}

#[async_trait]
impl ActiveWork for ActivityRegistry {
    async fn slotted_task_ids(&self) -> Result<HashSet<String>> {
        Ok(self.inner.read().unwrap().slotted.clone())
    }

    async fn active_agent_ids(&self) -> Result<HashSet<String>> {
        Ok(self.inner.read().unwrap().agents.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_and_release() {
        let registry = ActivityRegistry::new();

        assert!(registry.claim_slot("bd-1"));
        assert!(!registry.claim_slot("bd-1"));
        assert_eq!(registry.slot_count(), 1);
        assert!(registry.is_active("bd-1"));

        assert!(registry.release_slot("bd-1"));
        assert!(!registry.release_slot("bd-1"));
        assert!(!registry.is_active("bd-1"));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let registry = ActivityRegistry::new();
        let view = registry.clone();

        registry.claim_slot("bd-1");
        registry.register_agent("bd-2");

        let excluded = view.excluded_task_ids().await.unwrap();
        assert_eq!(excluded.len(), 2);
        assert!(excluded.contains("bd-1") && excluded.contains("bd-2"));

        registry.unregister_agent("bd-2");
        assert!(!view.active_agent_ids().await.unwrap().contains("bd-2"));
    }
}
