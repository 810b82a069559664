use crate::compose;
use crate::domain::clock::{Clock, LatencyProfile};
use crate::domain::labs::models::lab::{
    Container, ContainerId, CreateLabRequest, Lab, LabError, LabId, LabStats, LabStatus,
};
use crate::domain::labs::models::template::Template;
use crate::domain::labs::ports::{LabRepository, LabsService};
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One FIFO queue per lab: operations on the same lab complete in the order
/// they were issued, operations on different labs run side by side.
#[derive(Clone, Default)]
struct OperationGate {
    locks: Arc<StdMutex<HashMap<LabId, Arc<Mutex<()>>>>>,
}

impl OperationGate {
    async fn acquire(&self, lab_id: &LabId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(lab_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Give up `turn` and drop the lab's queue if nobody else is waiting on
    /// it. Used once the lab is gone or turned out never to exist.
    fn retire(&self, lab_id: &LabId, turn: OwnedMutexGuard<()>) {
        drop(turn);
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // the map holds the only reference when no operation is queued
        if locks.get(lab_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(lab_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

struct Loading(Arc<AtomicUsize>);

impl Loading {
    fn begin(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for Loading {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct Service<LR: LabRepository, C: Clock> {
    lab_repository: LR,
    clock: C,
    latency: LatencyProfile,
    gate: OperationGate,
    in_flight: Arc<AtomicUsize>,
}

impl<LR: LabRepository, C: Clock> Service<LR, C> {
    pub fn new(lab_repository: LR, clock: C, latency: LatencyProfile) -> Self {
        Self {
            lab_repository,
            clock,
            latency,
            gate: OperationGate::default(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn build_lab(
        &self,
        id: LabId,
        name: String,
        description: String,
        compose_text: String,
        is_custom: bool,
    ) -> Result<Lab, LabError> {
        let services = compose::outline(&compose_text)?;
        let created_at: DateTime<Utc> = self.clock.now();
        let containers = services
            .iter()
            .map(|service| {
                Container::new(
                    service.container_name(),
                    service.image.clone(),
                    service.ports.clone(),
                    LabStatus::Stopped,
                    created_at,
                )
            })
            .collect();
        Ok(Lab {
            id,
            name,
            description,
            status: LabStatus::Stopped,
            compose: compose_text,
            containers,
            created_at,
            is_custom,
        })
    }

    fn lab_from_template(&self, id: LabId, template: &Template) -> Result<Lab, LabError> {
        self.build_lab(
            id,
            template.name.clone(),
            template.description.clone(),
            template.compose.clone(),
            false,
        )
    }

    async fn transition(&self, lab_id: &LabId, target: LabStatus) -> Result<Lab, LabError> {
        let _loading = Loading::begin(&self.in_flight);
        let turn = self.gate.acquire(lab_id).await;
        let Some(lab) = self.lab_repository.get_lab(lab_id).await else {
            self.gate.retire(lab_id, turn);
            return Err(LabError::LabNotFound(lab_id.clone()));
        };
        if lab.status == target {
            return Err(LabError::AlreadyInState {
                id: lab_id.clone(),
                status: target,
            });
        }

        let delay = match target {
            LabStatus::Running => self.latency.start,
            _ => self.latency.stop,
        };
        debug!("{} -> {} in {:?}", lab_id, target, delay);
        self.clock.sleep(delay).await;

        let lab = self.cascade_status(lab_id, target).await?;
        info!("lab {} ({}) is {}", lab.name, lab_id, target);
        Ok(lab)
    }
}

impl<LR: LabRepository, C: Clock> LabsService for Service<LR, C> {
    async fn get_all_labs(&self) -> Vec<Lab> {
        self.lab_repository.get_all_labs().await
    }

    async fn get_lab(&self, lab_id: &LabId) -> Result<Lab, LabError> {
        self.lab_repository
            .get_lab(lab_id)
            .await
            .ok_or_else(|| LabError::LabNotFound(lab_id.clone()))
    }

    async fn create_lab(&self, req: CreateLabRequest) -> Result<Lab, LabError> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(LabError::MissingName);
        }
        let lab = self.build_lab(
            LabId::generate(),
            name,
            req.description.trim().to_string(),
            req.compose,
            true,
        )?;

        let _loading = Loading::begin(&self.in_flight);
        self.clock.sleep(self.latency.create).await;
        self.lab_repository.insert_lab(lab.clone()).await;
        info!(
            "created lab {} ({}) with {} containers",
            lab.name,
            lab.id,
            lab.containers.len()
        );
        Ok(lab)
    }

    async fn install_template(&self, template: &Template) -> Result<Lab, LabError> {
        let lab = self.lab_from_template(LabId::generate(), template)?;

        let _loading = Loading::begin(&self.in_flight);
        self.clock.sleep(self.latency.create).await;
        self.lab_repository.insert_lab(lab.clone()).await;
        info!("installed template {} as lab {}", template.id, lab.id);
        Ok(lab)
    }

    async fn finish_install(&self, lab_id: LabId, template: &Template) -> Result<Lab, LabError> {
        let lab = self.lab_from_template(lab_id, template)?;
        self.lab_repository.insert_lab(lab.clone()).await;
        info!("installed template {} as lab {}", template.id, lab.id);
        Ok(lab)
    }

    async fn start_lab(&self, lab_id: &LabId) -> Result<Lab, LabError> {
        self.transition(lab_id, LabStatus::Running).await
    }

    async fn stop_lab(&self, lab_id: &LabId) -> Result<Lab, LabError> {
        self.transition(lab_id, LabStatus::Stopped).await
    }

    async fn remove_lab(&self, lab_id: &LabId) -> Result<Lab, LabError> {
        let _loading = Loading::begin(&self.in_flight);
        let turn = self.gate.acquire(lab_id).await;
        if self.lab_repository.get_lab(lab_id).await.is_none() {
            self.gate.retire(lab_id, turn);
            return Err(LabError::LabNotFound(lab_id.clone()));
        }
        self.clock.sleep(self.latency.remove).await;

        let removed = self.lab_repository.remove_lab(lab_id).await;
        self.gate.retire(lab_id, turn);
        let lab = removed.ok_or_else(|| LabError::LabNotFound(lab_id.clone()))?;
        info!(
            "removed lab {} ({}) and {} containers",
            lab.name,
            lab_id,
            lab.containers.len()
        );
        Ok(lab)
    }

    async fn update_compose(&self, lab_id: &LabId, compose_text: &str) -> Result<Lab, LabError> {
        compose::outline(compose_text)?;
        let _loading = Loading::begin(&self.in_flight);
        let turn = self.gate.acquire(lab_id).await;
        if self.lab_repository.get_lab(lab_id).await.is_none() {
            self.gate.retire(lab_id, turn);
            return Err(LabError::LabNotFound(lab_id.clone()));
        }
        self.clock.sleep(self.latency.update).await;

        let compose_text = compose_text.to_string();
        let lab = self
            .lab_repository
            .modify_lab(lab_id, move |lab| lab.compose = compose_text)
            .await
            .ok_or_else(|| LabError::LabNotFound(lab_id.clone()))?;
        info!("updated compose text of lab {}", lab_id);
        Ok(lab)
    }

    async fn cascade_status(&self, lab_id: &LabId, status: LabStatus) -> Result<Lab, LabError> {
        self.lab_repository
            .modify_lab(lab_id, move |lab| {
                lab.status = status;
                for container in lab.containers.iter_mut() {
                    container.status = status;
                }
            })
            .await
            .ok_or_else(|| LabError::LabNotFound(lab_id.clone()))
    }

    async fn get_container(
        &self,
        lab_id: &LabId,
        container_id: &ContainerId,
    ) -> Result<Container, LabError> {
        let lab = self.get_lab(lab_id).await?;
        lab.container(container_id)
            .cloned()
            .ok_or_else(|| LabError::ContainerNotFound {
                lab: lab_id.clone(),
                container: container_id.clone(),
            })
    }

    async fn import_labs(&self, labs: Vec<Lab>) {
        info!("importing {} labs", labs.len());
        for lab in labs {
            self.lab_repository.insert_lab(lab).await;
        }
    }

    async fn stats(&self) -> LabStats {
        let labs = self.lab_repository.get_all_labs().await;
        LabStats {
            total_labs: labs.len(),
            running_labs: labs
                .iter()
                .filter(|l| l.status == LabStatus::Running)
                .count(),
            running_containers: labs.iter().map(Lab::running_containers).sum(),
        }
    }

    async fn recent_labs(&self, count: usize) -> Vec<Lab> {
        let mut labs = self.lab_repository.get_all_labs().await;
        labs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        labs.truncate(count);
        labs
    }

    fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::TokioClock;
    use crate::outbound::lab_memory::LabMemory;
    use crate::templates::builtin_templates;
    use std::time::Duration;
    use tokio::time::Instant;

    const WEB: &str = "version: '3.8'
services:
  web:
    image: nginx:alpine
    ports:
      - \"8080:80\"
  cache:
    image: redis:alpine
";

    fn service() -> Service<LabMemory, TokioClock> {
        Service::new(LabMemory::default(), TokioClock, LatencyProfile::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_lab_derives_stopped_containers() {
        let service = service();
        let started = Instant::now();
        let lab = service
            .create_lab(CreateLabRequest::new(" Web stack ", "nginx", WEB))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(1000));
        assert_eq!(lab.name, "Web stack");
        assert_eq!(lab.status, LabStatus::Stopped);
        assert!(lab.is_custom);
        assert_eq!(lab.compose, WEB);
        let names: Vec<&str> = lab.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["web", "cache"]);
        assert!(lab.containers.iter().all(|c| c.status == LabStatus::Stopped));
        assert_eq!(lab.containers[0].ports, vec!["8080:80".to_string()]);
        assert_eq!(service.get_all_labs().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_lab_rejects_invalid_input() {
        let service = service();
        let result = service
            .create_lab(CreateLabRequest::new("broken", "", "services:\n"))
            .await;
        assert!(matches!(result, Err(LabError::InvalidComposeText(_))));
        let result = service.create_lab(CreateLabRequest::new("  ", "", WEB)).await;
        assert!(matches!(result, Err(LabError::MissingName)));
        assert!(service.get_all_labs().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_cascade_to_containers() {
        let service = service();
        let lab = service
            .install_template(&builtin_templates()[1])
            .await
            .unwrap();
        assert!(!lab.is_custom);
        assert_eq!(lab.containers.len(), 2);

        let started = Instant::now();
        let running = service.start_lab(&lab.id).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(2000));
        assert_eq!(running.status, LabStatus::Running);
        assert!(running.containers.iter().all(|c| c.status == LabStatus::Running));
        assert_eq!(service.stats().await.running_containers, 2);

        let stopped = service.stop_lab(&lab.id).await.unwrap();
        assert_eq!(stopped.status, LabStatus::Stopped);
        assert!(stopped.containers.iter().all(|c| c.status == LabStatus::Stopped));
        assert_eq!(stopped.created_at, lab.created_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_lab_is_reported() {
        let service = service();
        let missing = LabId::new("lab-missing");
        assert!(matches!(
            service.start_lab(&missing).await,
            Err(LabError::LabNotFound(_))
        ));
        assert!(matches!(
            service.stop_lab(&missing).await,
            Err(LabError::LabNotFound(_))
        ));
        assert!(matches!(
            service.remove_lab(&missing).await,
            Err(LabError::LabNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_transition_is_rejected() {
        let service = service();
        let lab = service
            .create_lab(CreateLabRequest::new("web", "", WEB))
            .await
            .unwrap();
        assert!(matches!(
            service.stop_lab(&lab.id).await,
            Err(LabError::AlreadyInState {
                status: LabStatus::Stopped,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_on_one_lab_apply_in_issue_order() {
        let service = service();
        let lab = service
            .create_lab(CreateLabRequest::new("web", "", WEB))
            .await
            .unwrap();

        // stop is faster than start, but must still land last
        let (started, stopped) = tokio::join!(service.start_lab(&lab.id), service.stop_lab(&lab.id));
        assert_eq!(started.unwrap().status, LabStatus::Running);
        assert_eq!(stopped.unwrap().status, LabStatus::Stopped);
        assert_eq!(
            service.get_lab(&lab.id).await.unwrap().status,
            LabStatus::Stopped
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_labs_run_in_parallel() {
        let service = service();
        let a = service
            .create_lab(CreateLabRequest::new("a", "", WEB))
            .await
            .unwrap();
        let b = service
            .create_lab(CreateLabRequest::new("b", "", WEB))
            .await
            .unwrap();

        let started = Instant::now();
        let (ra, rb) = tokio::join!(service.start_lab(&a.id), service.start_lab(&b.id));
        ra.unwrap();
        rb.unwrap();
        assert!(started.elapsed() < Duration::from_millis(4000));
        assert_eq!(service.stats().await.running_labs, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_deletes_exactly_one_lab() {
        let service = service();
        let a = service
            .create_lab(CreateLabRequest::new("a", "", WEB))
            .await
            .unwrap();
        let b = service
            .create_lab(CreateLabRequest::new("b", "", WEB))
            .await
            .unwrap();

        let removed = service.remove_lab(&a.id).await.unwrap();
        assert_eq!(removed.id, a.id);
        let labs = service.get_all_labs().await;
        assert_eq!(labs.len(), 1);
        assert_eq!(labs[0].id, b.id);
        assert!(matches!(
            service.get_container(&a.id, &a.containers[0].id).await,
            Err(LabError::LabNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_compose_preserves_bytes_and_containers() {
        let service = service();
        let lab = service
            .create_lab(CreateLabRequest::new("web", "", WEB))
            .await
            .unwrap();
        let edited = "services:\n  api:\n    image: node:20  \n\n";
        let updated = service.update_compose(&lab.id, edited).await.unwrap();
        assert_eq!(updated.compose, edited);
        assert_eq!(updated.containers, lab.containers);
        assert_eq!(updated.status, LabStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_compose_on_unknown_lab() {
        let service = service();
        let result = service.update_compose(&LabId::new("lab-missing"), WEB).await;
        assert!(matches!(result, Err(LabError::LabNotFound(_))));
        assert!(service.get_all_labs().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_compose_rejects_invalid_text() {
        let service = service();
        let lab = service
            .create_lab(CreateLabRequest::new("web", "", WEB))
            .await
            .unwrap();
        for broken in ["", "networks:\n  default:\n", "services:\n  web:\n    ports: [\"80:80\"]\n"] {
            let result = service.update_compose(&lab.id, broken).await;
            assert!(
                matches!(result, Err(LabError::InvalidComposeText(_))),
                "{broken:?} was accepted"
            );
        }
        assert_eq!(service.get_lab(&lab.id).await.unwrap(), lab);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_ids_leave_no_queue_behind() {
        let service = service();
        for i in 0..50 {
            let missing = LabId::new(format!("missing-{i}"));
            assert!(service.start_lab(&missing).await.is_err());
            assert!(service.stop_lab(&missing).await.is_err());
            assert!(service.remove_lab(&missing).await.is_err());
            assert!(service.update_compose(&missing, WEB).await.is_err());
        }
        assert_eq!(service.gate.len(), 0);

        let lab = service
            .create_lab(CreateLabRequest::new("web", "", WEB))
            .await
            .unwrap();
        let (removed, started) =
            tokio::join!(service.remove_lab(&lab.id), service.start_lab(&lab.id));
        removed.unwrap();
        assert!(matches!(started, Err(LabError::LabNotFound(_))));
        assert_eq!(service.gate.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_flag_tracks_in_flight_operations() {
        let service = service();
        assert!(!service.is_loading());
        let pending = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .create_lab(CreateLabRequest::new("web", "", WEB))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(service.is_loading());
        pending.await.unwrap().unwrap();
        assert!(!service.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_container_and_recent_labs() {
        let service = service();
        let first = service
            .create_lab(CreateLabRequest::new("first", "", WEB))
            .await
            .unwrap();
        let second = service
            .create_lab(CreateLabRequest::new("second", "", WEB))
            .await
            .unwrap();

        let container = service
            .get_container(&first.id, &first.containers[1].id)
            .await
            .unwrap();
        assert_eq!(container.image, "redis:alpine");
        assert!(matches!(
            service
                .get_container(&first.id, &ContainerId::new("nope"))
                .await,
            Err(LabError::ContainerNotFound { .. })
        ));

        let recent = service.recent_labs(1).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, second.id);
    }
}
