use crate::domain::labs::models::lab::{
    Container, ContainerId, CreateLabRequest, Lab, LabError, LabId, LabStats, LabStatus,
};
use crate::domain::labs::models::template::Template;

// A lab repository owns the lab collection
pub trait LabRepository: Send + Sync + 'static + Clone {
    fn insert_lab(&self, lab: Lab) -> impl Future<Output = ()> + Send;

    fn get_lab(&self, lab_id: &LabId) -> impl Future<Output = Option<Lab>> + Send;

    /// All labs in insertion order.
    fn get_all_labs(&self) -> impl Future<Output = Vec<Lab>> + Send;

    /// Apply `change` to the stored lab and return the updated copy.
    fn modify_lab<F>(&self, lab_id: &LabId, change: F) -> impl Future<Output = Option<Lab>> + Send
    where
        F: FnOnce(&mut Lab) + Send;

    fn remove_lab(&self, lab_id: &LabId) -> impl Future<Output = Option<Lab>> + Send;
}

// A labs service drives the simulated lifecycle of labs
pub trait LabsService: Send + Sync + 'static + Clone {
    fn get_all_labs(&self) -> impl Future<Output = Vec<Lab>> + Send;

    fn get_lab(&self, lab_id: &LabId) -> impl Future<Output = Result<Lab, LabError>> + Send;

    fn create_lab(&self, req: CreateLabRequest) -> impl Future<Output = Result<Lab, LabError>> + Send;

    fn install_template(&self, template: &Template) -> impl Future<Output = Result<Lab, LabError>> + Send;

    /// Insert a lab for `template` under an id minted by an install session.
    /// The session already played the latency, so this adds none.
    fn finish_install(
        &self,
        lab_id: LabId,
        template: &Template,
    ) -> impl Future<Output = Result<Lab, LabError>> + Send;

    fn start_lab(&self, lab_id: &LabId) -> impl Future<Output = Result<Lab, LabError>> + Send;

    fn stop_lab(&self, lab_id: &LabId) -> impl Future<Output = Result<Lab, LabError>> + Send;

    fn remove_lab(&self, lab_id: &LabId) -> impl Future<Output = Result<Lab, LabError>> + Send;

    fn update_compose(
        &self,
        lab_id: &LabId,
        compose: &str,
    ) -> impl Future<Output = Result<Lab, LabError>> + Send;

    /// Set the lab and every one of its containers to `status`.
    fn cascade_status(
        &self,
        lab_id: &LabId,
        status: LabStatus,
    ) -> impl Future<Output = Result<Lab, LabError>> + Send;

    fn get_container(
        &self,
        lab_id: &LabId,
        container_id: &ContainerId,
    ) -> impl Future<Output = Result<Container, LabError>> + Send;

    /// Adopt labs as they are, e.g. the result of `GET /api/lab`.
    fn import_labs(&self, labs: Vec<Lab>) -> impl Future<Output = ()> + Send;

    fn stats(&self) -> impl Future<Output = LabStats> + Send;

    /// The `count` most recently created labs, newest first.
    fn recent_labs(&self, count: usize) -> impl Future<Output = Vec<Lab>> + Send;

    fn is_loading(&self) -> bool;
}
