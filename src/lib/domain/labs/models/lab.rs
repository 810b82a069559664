use crate::compose::ComposeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use uuid::Uuid;

#[derive(Deserialize, Serialize, Debug, Clone, Hash, Eq, PartialEq)]
pub struct LabId(pub String);

impl LabId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh identifier of the form `lab-<uuid>`.
    pub fn generate() -> Self {
        Self(format!("lab-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LabId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Hash, Eq, PartialEq)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("cont-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContainerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared by labs and their containers.
///
/// `Error` is never produced by any simulated transition; it only arrives with
/// labs loaded from an external source.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LabStatus {
    Running,
    Stopped,
    Error,
}

impl Display for LabStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LabStatus::Running => write!(f, "running"),
            LabStatus::Stopped => write!(f, "stopped"),
            LabStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Container {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub status: LabStatus,
    pub ports: Vec<String>,
    pub created: DateTime<Utc>,
}

impl Container {
    /// The status is always taken from the caller, never inferred.
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        ports: Vec<String>,
        status: LabStatus,
        created: DateTime<Utc>,
    ) -> Self {
        let mut unique_ports: Vec<String> = Vec::with_capacity(ports.len());
        for port in ports {
            if !unique_ports.contains(&port) {
                unique_ports.push(port);
            }
        }
        Self {
            id: ContainerId::generate(),
            name: name.into(),
            image: image.into(),
            status,
            ports: unique_ports,
            created,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lab {
    pub id: LabId,
    pub name: String,
    pub description: String,
    pub status: LabStatus,
    pub compose: String,
    pub containers: Vec<Container>,
    pub created_at: DateTime<Utc>,
    pub is_custom: bool,
}

impl Lab {
    pub fn container(&self, container_id: &ContainerId) -> Option<&Container> {
        self.containers.iter().find(|c| &c.id == container_id)
    }

    pub fn running_containers(&self) -> usize {
        self.containers
            .iter()
            .filter(|c| c.status == LabStatus::Running)
            .count()
    }
}

pub struct CreateLabRequest {
    pub name: String,
    pub description: String,
    pub compose: String,
}

impl CreateLabRequest {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        compose: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            compose: compose.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabStats {
    pub total_labs: usize,
    pub running_labs: usize,
    pub running_containers: usize,
}

#[derive(Debug, Error)]
pub enum LabError {
    #[error("lab {0} not found")]
    LabNotFound(LabId),
    #[error("container {container} not found in lab {lab}")]
    ContainerNotFound { lab: LabId, container: ContainerId },
    #[error("invalid compose text: {0}")]
    InvalidComposeText(#[from] ComposeError),
    #[error("lab name must not be empty")]
    MissingName,
    #[error("lab {id} is already {status}")]
    AlreadyInState { id: LabId, status: LabStatus },
}
