//! Simulated install of a template, played back as six build steps.
//!
//! Steps run strictly one after another: a step only starts once the previous
//! one has completed. The session runs as its own task and stops as soon as it
//! is cancelled or dropped, in which case no lab is created.
use crate::compose::{self, ComposeOutline};
use crate::domain::clock::Clock;
use crate::domain::labs::models::lab::{Lab, LabError, LabId};
use crate::domain::labs::models::template::Template;
use crate::domain::labs::ports::LabsService;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Validate,
    Pull,
    Network,
    Volumes,
    Containers,
    Health,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Validate,
        Phase::Pull,
        Phase::Network,
        Phase::Volumes,
        Phase::Containers,
        Phase::Health,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Validate => "Validating Docker Compose",
            Phase::Pull => "Pulling Docker Images",
            Phase::Network => "Creating Networks",
            Phase::Volumes => "Creating Volumes",
            Phase::Containers => "Starting Containers",
            Phase::Health => "Health Checks",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStep {
    pub id: Phase,
    pub name: &'static str,
    pub status: StepStatus,
    pub logs: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl BuildStep {
    fn pending(phase: Phase) -> Self {
        Self {
            id: phase,
            name: phase.label(),
            status: StepStatus::Pending,
            logs: Vec::new(),
            start_time: None,
            end_time: None,
        }
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.end_time? - self.start_time?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Building,
    Completed,
    Failed,
    Cancelled,
}

/// Snapshot of an install session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildProgress {
    pub lab_id: LabId,
    pub steps: Vec<BuildStep>,
    pub current: usize,
    pub status: BuildStatus,
}

impl BuildProgress {
    fn new(lab_id: LabId) -> Self {
        Self {
            lab_id,
            steps: Phase::ALL.into_iter().map(BuildStep::pending).collect(),
            current: 0,
            status: BuildStatus::Building,
        }
    }

    /// Completed steps over all steps, 0 to 100.
    pub fn percent(&self) -> u8 {
        let done = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        (done * 100 / self.steps.len()) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    StepStarted(Phase),
    Log(Phase, String),
    StepCompleted(Phase),
    StepFailed(Phase),
    Finished(LabId),
}

/// Delay before each log line (uniform in `line_min..line_max`) and between steps.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub line_min: Duration,
    pub line_max: Duration,
    pub step_gap: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            line_min: Duration::from_millis(200),
            line_max: Duration::from_millis(700),
            step_gap: Duration::from_millis(500),
        }
    }
}

impl Pacing {
    pub fn instant() -> Self {
        Self {
            line_min: Duration::ZERO,
            line_max: Duration::ZERO,
            step_gap: Duration::ZERO,
        }
    }

    fn line_delay(&self) -> Duration {
        let min = self.line_min.as_millis() as u64;
        let max = self.line_max.as_millis() as u64;
        if max <= min {
            return self.line_min;
        }
        Duration::from_millis(rand::rng().random_range(min..max))
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("install was cancelled")]
    Cancelled,
    #[error(transparent)]
    Lab(#[from] LabError),
    #[error("install task failed: {0}")]
    Task(String),
}

/// Log lines shown for `phase` while installing `template`. Every phase after
/// `Validate` reads the services and volumes from `outline`.
pub fn step_logs(phase: Phase, template: &Template, outline: &ComposeOutline) -> Vec<String> {
    let slug = template.slug();
    let mut logs = Vec::new();
    match phase {
        Phase::Validate => {
            logs.push("Parsing docker-compose.yml...".to_string());
            logs.push("Validating service definitions...".to_string());
            logs.push("Checking for syntax errors...".to_string());
        }
        Phase::Pull => {
            logs.push(format!("Pulling {slug} images..."));
            for image in compose::images(&outline.services) {
                logs.push(format!("Pulling {image}... ████████████████ 100%"));
            }
            logs.push("✓ All images pulled successfully".to_string());
        }
        Phase::Network => {
            logs.push("Creating default network...".to_string());
            logs.push(format!("Creating {slug}_default network"));
            logs.push("✓ Networks created successfully".to_string());
        }
        Phase::Volumes => {
            logs.push("Creating named volumes...".to_string());
            for volume in &outline.volumes {
                logs.push(format!("Creating volume {volume}..."));
            }
            logs.push("✓ Volumes created successfully".to_string());
        }
        Phase::Containers => {
            logs.push("Starting containers...".to_string());
            for service in &outline.services {
                logs.push(format!("Container {} started", service.container_name()));
            }
            logs.push("✓ All containers started successfully".to_string());
        }
        Phase::Health => {
            logs.push("Performing health checks...".to_string());
            logs.push("Checking container connectivity...".to_string());
            logs.push("Verifying service endpoints...".to_string());
            logs.push("✓ All health checks passed".to_string());
        }
    }
    logs
}

struct Build<S: LabsService, C: Clock> {
    service: S,
    clock: C,
    template: Template,
    pacing: Pacing,
    lab_id: LabId,
    progress: watch::Sender<BuildProgress>,
    events: mpsc::UnboundedSender<BuildEvent>,
}

impl<S: LabsService, C: Clock> Build<S, C> {
    fn emit(&self, event: BuildEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }

    async fn log(&self, index: usize, phase: Phase, line: String) {
        self.clock.sleep(self.pacing.line_delay()).await;
        debug!("[{}] {}", self.lab_id, line);
        self.progress
            .send_modify(|p| p.steps[index].logs.push(line.clone()));
        self.emit(BuildEvent::Log(phase, line));
    }

    fn fail(&self, index: usize, phase: Phase) {
        let now = self.clock.now();
        self.progress.send_modify(|p| {
            p.steps[index].status = StepStatus::Failed;
            p.steps[index].end_time = Some(now);
            p.status = BuildStatus::Failed;
        });
        self.emit(BuildEvent::StepFailed(phase));
    }

    async fn run(&self) -> Result<Lab, InstallError> {
        let mut outline = ComposeOutline::default();
        for (index, phase) in Phase::ALL.into_iter().enumerate() {
            let started = self.clock.now();
            self.progress.send_modify(|p| {
                p.current = index;
                p.steps[index].status = StepStatus::Running;
                p.steps[index].start_time = Some(started);
            });
            self.emit(BuildEvent::StepStarted(phase));
            info!("{}: {}", self.lab_id, phase.label());

            for line in step_logs(phase, &self.template, &outline) {
                self.log(index, phase, line).await;
            }

            if phase == Phase::Validate {
                match compose::parse(&self.template.compose) {
                    Ok(parsed) => {
                        outline = parsed;
                        self.log(index, phase, "✓ Docker Compose file is valid".to_string())
                            .await
                    }
                    Err(e) => {
                        self.log(index, phase, format!("✗ {e}")).await;
                        self.fail(index, phase);
                        return Err(LabError::InvalidComposeText(e).into());
                    }
                }
            }

            let finished = self.clock.now();
            self.progress.send_modify(|p| {
                p.steps[index].status = StepStatus::Completed;
                p.steps[index].end_time = Some(finished);
            });
            self.emit(BuildEvent::StepCompleted(phase));
            self.clock.sleep(self.pacing.step_gap).await;
        }

        let lab = self
            .service
            .finish_install(self.lab_id.clone(), &self.template)
            .await?;
        self.progress.send_modify(|p| p.status = BuildStatus::Completed);
        self.emit(BuildEvent::Finished(lab.id.clone()));
        Ok(lab)
    }
}

pub struct InstallSession {
    lab_id: LabId,
    progress: watch::Receiver<BuildProgress>,
    events: Option<mpsc::UnboundedReceiver<BuildEvent>>,
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<Lab, InstallError>>,
}

impl InstallSession {
    /// Mint a lab id and start playing back the build of `template`.
    pub fn start<S: LabsService, C: Clock>(
        service: S,
        clock: C,
        template: Template,
        pacing: Pacing,
    ) -> Self {
        let lab_id = LabId::generate();
        let (progress_tx, progress) = watch::channel(BuildProgress::new(lab_id.clone()));
        let (events_tx, events) = mpsc::unbounded_channel();
        let (cancel, mut cancelled) = oneshot::channel::<()>();

        info!("installing {} as lab {}", template.id, lab_id);
        let build = Build {
            service,
            clock,
            template,
            pacing,
            lab_id: lab_id.clone(),
            progress: progress_tx,
            events: events_tx,
        };
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = &mut cancelled => {
                    warn!("install of lab {} cancelled", build.lab_id);
                    build.progress.send_modify(|p| p.status = BuildStatus::Cancelled);
                    Err(InstallError::Cancelled)
                }
                result = build.run() => result,
            }
        });

        Self {
            lab_id,
            progress,
            events: Some(events),
            cancel: Some(cancel),
            handle,
        }
    }

    /// Id the lab will have once the install completes.
    pub fn lab_id(&self) -> &LabId {
        &self.lab_id
    }

    pub fn progress(&self) -> BuildProgress {
        self.progress.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BuildProgress> {
        self.progress.clone()
    }

    /// Ordered step and log events. Only the first call gets the receiver.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<BuildEvent>> {
        self.events.take()
    }

    /// Stop the build. Dropping the session has the same effect.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub async fn wait(self) -> Result<Lab, InstallError> {
        let InstallSession { cancel, handle, .. } = self;
        let _cancel = cancel;
        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(InstallError::Cancelled),
            Err(e) => Err(InstallError::Task(e.to_string())),
        }
    }
}
