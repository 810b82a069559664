use crate::domain::labs::models::lab::{Lab, LabId};
use crate::domain::labs::ports::LabRepository;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Lab collection kept for the lifetime of the process, never persisted.
#[derive(Clone, Default)]
pub struct LabMemory {
    labs: Arc<RwLock<Vec<Lab>>>,
}

impl LabMemory {
    pub fn with_labs(labs: Vec<Lab>) -> Self {
        Self {
            labs: Arc::new(RwLock::new(labs)),
        }
    }
}

impl LabRepository for LabMemory {
    /// A lab with the same id is replaced in place.
    async fn insert_lab(&self, lab: Lab) {
        let mut labs = self.labs.write().await;
        match labs.iter_mut().find(|l| l.id == lab.id) {
            Some(existing) => *existing = lab,
            None => labs.push(lab),
        }
    }

    async fn get_lab(&self, lab_id: &LabId) -> Option<Lab> {
        let labs = self.labs.read().await;
        labs.iter().find(|l| &l.id == lab_id).cloned()
    }

    async fn get_all_labs(&self) -> Vec<Lab> {
        let labs = self.labs.read().await;
        labs.clone()
    }

    async fn modify_lab<F>(&self, lab_id: &LabId, change: F) -> Option<Lab>
    where
        F: FnOnce(&mut Lab) + Send,
    {
        let mut labs = self.labs.write().await;
        let lab = labs.iter_mut().find(|l| &l.id == lab_id)?;
        change(lab);
        Some(lab.clone())
    }

    async fn remove_lab(&self, lab_id: &LabId) -> Option<Lab> {
        let mut labs = self.labs.write().await;
        let index = labs.iter().position(|l| &l.id == lab_id)?;
        Some(labs.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::labs::models::lab::LabStatus;
    use chrono::Utc;

    fn lab(id: &str) -> Lab {
        Lab {
            id: LabId::new(id),
            name: id.to_string(),
            description: String::new(),
            status: LabStatus::Stopped,
            compose: String::new(),
            containers: vec![],
            created_at: Utc::now(),
            is_custom: true,
        }
    }

    #[tokio::test]
    async fn test_insert_keeps_order_and_replaces_same_id() {
        let memory = LabMemory::default();
        memory.insert_lab(lab("a")).await;
        memory.insert_lab(lab("b")).await;
        let mut replacement = lab("a");
        replacement.name = "renamed".to_string();
        memory.insert_lab(replacement).await;

        let labs = memory.get_all_labs().await;
        assert_eq!(labs.len(), 2);
        assert_eq!(labs[0].name, "renamed");
        assert_eq!(labs[1].id, LabId::new("b"));
    }

    #[tokio::test]
    async fn test_remove_only_touches_matching_lab() {
        let memory = LabMemory::with_labs(vec![lab("a"), lab("b")]);
        assert!(memory.remove_lab(&LabId::new("missing")).await.is_none());
        let removed = memory.remove_lab(&LabId::new("a")).await.unwrap();
        assert_eq!(removed.id, LabId::new("a"));
        assert_eq!(memory.get_all_labs().await.len(), 1);
        assert!(memory.get_lab(&LabId::new("b")).await.is_some());
    }

    #[tokio::test]
    async fn test_modify_missing_lab_returns_none() {
        let memory = LabMemory::default();
        let result = memory
            .modify_lab(&LabId::new("x"), |l| l.status = LabStatus::Running)
            .await;
        assert!(result.is_none());
    }
}
