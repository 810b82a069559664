//! Simulated container logs for a lab: a random backlog plus a live tail.
use crate::domain::clock::Clock;
use crate::domain::labs::models::lab::{Lab, LabId};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Duration;

const BACKLOG_SIZE: usize = 100;
const BACKLOG_SPACING_SECS: i64 = 30;
pub const TAIL_INTERVAL: Duration = Duration::from_secs(3);
const REFRESH_DELAY: Duration = Duration::from_millis(1000);

const LEVELS: [LogLevel; 4] = [LogLevel::Info, LogLevel::Warn, LogLevel::Error, LogLevel::Debug];

const SOURCES: [&str; 6] = ["nginx", "app", "database", "cache", "auth", "api"];

const BACKLOG_MESSAGES: [&str; 20] = [
    "Container started successfully",
    "Health check passed - all systems operational",
    "Processing HTTP request from 192.168.1.100",
    "Database connection pool initialized (10 connections)",
    "Memory usage: 245MB / 512MB (47.8%)",
    "Cache hit ratio: 95.2% (excellent performance)",
    "SSL certificate validation successful",
    "Backup operation completed in 2.3 seconds",
    "User authentication successful for user@example.com",
    "API rate limit exceeded for client 192.168.1.50",
    "Connection timeout occurred after 30 seconds",
    "Invalid JSON payload in request body",
    "Service temporarily unavailable - retrying in 5s",
    "Configuration file reloaded successfully",
    "Metrics collection completed - 1,247 data points",
    "Docker image pull completed: nginx:alpine",
    "Port 8080 is now listening for connections",
    "Environment variables loaded from .env file",
    "Worker process spawned with PID 1234",
    "Graceful shutdown initiated by SIGTERM",
];

const LIVE_MESSAGES: [&str; 5] = [
    "New request processed successfully",
    "Background task completed",
    "Cache entry expired and refreshed",
    "Health check ping received",
    "Session cleanup completed",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            "debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    fn upper(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub source: String,
}

impl Display for LogEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {:<5} [{:<8}] {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level.upper(),
            self.source,
            self.message
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub level: Option<LogLevel>,
    pub search: Option<String>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if self.level.is_some_and(|level| level != entry.level) {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => {
                let term = term.to_lowercase();
                entry.message.to_lowercase().contains(&term)
                    || entry.source.to_lowercase().contains(&term)
            }
            None => true,
        }
    }
}

/// `all` counts what passes the filter, the per-level counts ignore it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub all: usize,
    pub error: usize,
    pub warn: usize,
    pub info: usize,
    pub debug: usize,
}

pub struct LogViewer<C: Clock> {
    lab_id: LabId,
    lab_name: String,
    clock: C,
    rng: StdRng,
    entries: Vec<LogEntry>,
    sequence: u64,
}

impl<C: Clock> LogViewer<C> {
    pub fn new(lab: &Lab, clock: C) -> Self {
        Self::with_rng(lab, clock, StdRng::from_os_rng())
    }

    pub fn with_seed(lab: &Lab, clock: C, seed: u64) -> Self {
        Self::with_rng(lab, clock, StdRng::seed_from_u64(seed))
    }

    fn with_rng(lab: &Lab, clock: C, rng: StdRng) -> Self {
        let mut viewer = Self {
            lab_id: lab.id.clone(),
            lab_name: lab.name.clone(),
            clock,
            rng,
            entries: Vec::new(),
            sequence: 0,
        };
        viewer.fill_backlog();
        viewer
    }

    fn entry(&mut self, timestamp: DateTime<Utc>, messages: &[&str]) -> LogEntry {
        self.sequence += 1;
        let level = LEVELS[self.rng.random_range(0..LEVELS.len())];
        let source = SOURCES[self.rng.random_range(0..SOURCES.len())];
        let message = messages[self.rng.random_range(0..messages.len())];
        LogEntry {
            id: format!("{}-log-{}", self.lab_id, self.sequence),
            timestamp,
            level,
            message: message.to_string(),
            source: source.to_string(),
        }
    }

    fn fill_backlog(&mut self) {
        let now = self.clock.now();
        let entries: Vec<LogEntry> = (0..BACKLOG_SIZE)
            .map(|i| {
                let age = chrono::Duration::seconds(BACKLOG_SPACING_SECS * (BACKLOG_SIZE - i) as i64);
                self.entry(now - age, &BACKLOG_MESSAGES)
            })
            .collect();
        self.entries = entries;
    }

    /// Replace the entries with a fresh backlog after a short delay.
    pub async fn refresh(&mut self) {
        self.clock.sleep(REFRESH_DELAY).await;
        self.fill_backlog();
    }

    /// Append one live entry stamped now.
    pub fn tail(&mut self) -> &LogEntry {
        let entry = self.entry(self.clock.now(), &LIVE_MESSAGES);
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Wait one auto-refresh tick, then append a live entry.
    pub async fn next(&mut self) -> &LogEntry {
        self.clock.sleep(TAIL_INTERVAL).await;
        self.tail()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn filtered(&self, filter: &LogFilter) -> Vec<&LogEntry> {
        self.entries.iter().filter(|e| filter.matches(e)).collect()
    }

    pub fn counts(&self, filter: &LogFilter) -> LevelCounts {
        let mut counts = LevelCounts {
            all: self.filtered(filter).len(),
            ..Default::default()
        };
        for entry in &self.entries {
            match entry.level {
                LogLevel::Error => counts.error += 1,
                LogLevel::Warn => counts.warn += 1,
                LogLevel::Info => counts.info += 1,
                LogLevel::Debug => counts.debug += 1,
            }
        }
        counts
    }

    /// Filtered entries rendered one per line, as downloaded or copied.
    pub fn export(&self, filter: &LogFilter) -> String {
        self.filtered(filter)
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn export_file_name(&self) -> String {
        format!(
            "{}-logs-{}.txt",
            self.lab_name,
            self.clock.now().format("%Y-%m-%d")
        )
    }
}
