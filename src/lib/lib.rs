//! Simulated docker labs: named collections of containers defined by compose text.
//!
//! Nothing in here talks to a container runtime. Lifecycle transitions, the exec
//! shell, build logs and container logs are all simulated with timed delays so a
//! presentation layer has something realistic to drive.
pub mod compose;
pub mod config;
pub mod domain;
pub mod install;
pub mod logs;
pub mod outbound;
pub mod shell;
pub mod templates;
