//! Compose text helpers.
//!
//! [`generate`] renders form-style service descriptors into compose text. It is
//! one-way: edited compose text is never turned back into descriptors.
//! [`parse`] reads compose text with `serde_yaml` and keeps only what a lab
//! needs: service names, images, container names, published ports and named
//! volumes.
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

const HEADER: &str = "version: '3.8'\nservices:\n";

/// One service as entered in the form builder.
///
/// `ports` and `volumes` are comma separated, `environment` holds one
/// `KEY=VALUE` pair per line.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub ports: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub volumes: String,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_ports(mut self, ports: impl Into<String>) -> Self {
        self.ports = ports.into();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_volumes(mut self, volumes: impl Into<String>) -> Self {
        self.volumes = volumes.into();
        self
    }

    fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.image.trim().is_empty()
    }
}

fn comma_tokens(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|t| !t.is_empty())
}

fn env_pairs(value: &str) -> impl Iterator<Item = (&str, &str)> {
    value.lines().filter_map(|line| {
        let (key, value) = line.split_once('=')?;
        let (key, value) = (key.trim(), value.trim());
        (!key.is_empty() && !value.is_empty()).then_some((key, value))
    })
}

/// Render descriptors into compose text.
///
/// Descriptors without a name or image are skipped. Returns `None` when nothing
/// is left, so the caller keeps whatever compose text it already had.
pub fn generate(services: &[ServiceDescriptor]) -> Option<String> {
    let included: Vec<&ServiceDescriptor> = services.iter().filter(|s| s.is_complete()).collect();
    if included.is_empty() {
        return None;
    }

    let mut compose = String::from(HEADER);
    for service in included {
        compose.push_str(&format!("  {}:\n", service.name.trim()));
        compose.push_str(&format!("    image: {}\n", service.image.trim()));

        let ports: Vec<&str> = comma_tokens(&service.ports).collect();
        if !ports.is_empty() {
            compose.push_str("    ports:\n");
            for port in ports {
                compose.push_str(&format!("      - \"{port}\"\n"));
            }
        }

        let environment: Vec<(&str, &str)> = env_pairs(&service.environment).collect();
        if !environment.is_empty() {
            compose.push_str("    environment:\n");
            for (key, value) in environment {
                compose.push_str(&format!("      {key}: {value}\n"));
            }
        }

        let volumes: Vec<&str> = comma_tokens(&service.volumes).collect();
        if !volumes.is_empty() {
            compose.push_str("    volumes:\n");
            for volume in volumes {
                compose.push_str(&format!("      - {volume}\n"));
            }
        }

        compose.push_str("    restart: unless-stopped\n\n");
    }
    Some(compose)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("compose text is empty")]
    Empty,
    #[error("{0}")]
    Syntax(String),
    #[error("no top-level `services:` section")]
    MissingServices,
    #[error("`services:` section declares no services")]
    NoServices,
    #[error("service `{0}` has no image")]
    MissingImage(String),
}

impl From<serde_yaml::Error> for ComposeError {
    fn from(e: serde_yaml::Error) -> Self {
        ComposeError::Syntax(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOutline {
    pub name: String,
    pub image: String,
    pub container_name: Option<String>,
    pub ports: Vec<String>,
}

impl ServiceOutline {
    /// Name the container gets when the service is brought up.
    pub fn container_name(&self) -> &str {
        self.container_name.as_deref().unwrap_or(&self.name)
    }
}

/// What a lab needs to know about a compose file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeOutline {
    pub services: Vec<ServiceOutline>,
    /// Names declared under the top-level `volumes:` section.
    pub volumes: Vec<String>,
}

// Only the keys a lab cares about, everything else in a service is ignored.
#[derive(Deserialize)]
struct ServiceSpec {
    image: Option<String>,
    container_name: Option<String>,
    ports: Option<Vec<PortSpec>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortSpec {
    Long {
        target: Value,
        published: Option<Value>,
        protocol: Option<String>,
    },
    Short(Value),
}

impl PortSpec {
    fn render(&self) -> Option<String> {
        match self {
            PortSpec::Short(value) => scalar(value),
            PortSpec::Long {
                target,
                published,
                protocol,
            } => {
                let target = scalar(target)?;
                let mut port = match published.as_ref().and_then(scalar) {
                    Some(published) => format!("{published}:{target}"),
                    None => target,
                };
                if let Some(protocol) = protocol.as_deref().filter(|p| *p != "tcp") {
                    port.push('/');
                    port.push_str(protocol);
                }
                Some(port)
            }
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn key_name(key: &Value) -> Result<String, ComposeError> {
    scalar(key).ok_or_else(|| ComposeError::Syntax(format!("unsupported mapping key {key:?}")))
}

fn service_outline(name: String, body: &Value) -> Result<ServiceOutline, ComposeError> {
    if body.is_null() {
        return Err(ComposeError::MissingImage(name));
    }
    let spec: ServiceSpec = serde_yaml::from_value(body.clone())?;
    let image = match spec.image.map(|i| i.trim().to_string()) {
        Some(image) if !image.is_empty() => image,
        _ => return Err(ComposeError::MissingImage(name)),
    };
    let ports = spec
        .ports
        .unwrap_or_default()
        .iter()
        .filter_map(PortSpec::render)
        .collect();
    Ok(ServiceOutline {
        name,
        image,
        container_name: spec.container_name,
        ports,
    })
}

/// Read the services (in declaration order) and named volumes of compose text.
pub fn parse(text: &str) -> Result<ComposeOutline, ComposeError> {
    if text.trim().is_empty() {
        return Err(ComposeError::Empty);
    }
    let document: Value = serde_yaml::from_str(text)?;
    let services = match document.get("services") {
        None => return Err(ComposeError::MissingServices),
        Some(Value::Null) => return Err(ComposeError::NoServices),
        Some(Value::Mapping(services)) if services.is_empty() => {
            return Err(ComposeError::NoServices);
        }
        Some(Value::Mapping(services)) => services,
        Some(_) => return Err(ComposeError::Syntax("`services` must be a mapping".to_string())),
    };

    let services = services
        .iter()
        .map(|(key, body)| service_outline(key_name(key)?, body))
        .collect::<Result<Vec<_>, _>>()?;
    let volumes: Vec<String> = match document.get("volumes") {
        Some(Value::Mapping(volumes)) => volumes.keys().map(key_name).collect::<Result<_, _>>()?,
        _ => Vec::new(),
    };
    Ok(ComposeOutline { services, volumes })
}

/// The services of compose text, see [`parse`].
pub fn outline(text: &str) -> Result<Vec<ServiceOutline>, ComposeError> {
    parse(text).map(|outline| outline.services)
}

/// Distinct images in declaration order.
pub fn images(services: &[ServiceOutline]) -> Vec<&str> {
    let mut images: Vec<&str> = Vec::new();
    for service in services {
        if !images.contains(&service.image.as_str()) {
            images.push(&service.image);
        }
    }
    images
}
