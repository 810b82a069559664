//! Simulated `docker exec` shell.
//!
//! A fixed table of commands is answered with canned output after a short
//! delay. Anything else is "not found" with exit code 127.
use crate::domain::clock::Clock;
use crate::domain::labs::models::lab::{Container, ContainerId, LabError, LabId};
use crate::domain::labs::ports::LabsService;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub const EXIT_OK: i32 = 0;
pub const EXIT_NOT_FOUND: i32 = 127;

const DEFAULT_DELAY: Duration = Duration::from_millis(150);

const COMMANDS: &[(&str, &str)] = &[
    (
        "ls",
        "bin  boot  dev  etc  home  lib  lib64  media  mnt  opt  proc  root  run  sbin  srv  sys  tmp  usr  var",
    ),
    ("pwd", "/usr/share/nginx/html"),
    ("whoami", "root"),
    (
        "ps aux",
        "PID   USER     COMMAND\n1     root     nginx: master process nginx -g daemon off;\n7     nginx    nginx: worker process",
    ),
    (
        "cat /etc/os-release",
        "NAME=\"Alpine Linux\"\nID=alpine\nVERSION_ID=3.18.4\nPRETTY_NAME=\"Alpine Linux v3.18\"",
    ),
    (
        "df -h",
        "Filesystem      Size  Used Avail Use% Mounted on\n/dev/sda1        20G  2.1G   17G  11% /",
    ),
    (
        "free -h",
        "              total        used        free      shared  buff/cache   available\nMem:          2.0Gi       145Mi       1.7Gi       0.0Ki        89Mi       1.7Gi\nSwap:            0B          0B          0B",
    ),
    (
        "uname -a",
        "Linux container-name 5.15.0-56-generic #62-Ubuntu x86_64 GNU/Linux",
    ),
    (
        "env",
        "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin\nHOSTNAME=container-name\nNGINX_VERSION=1.24.0",
    ),
    (
        "help",
        "Available commands: ls, pwd, whoami, ps aux, cat, df -h, free -h, uname -a, env, date, clear, exit, help",
    ),
];

/// Canned output and exit code for `command`.
pub fn lookup(command: &str, now: DateTime<Utc>) -> (String, i32) {
    if command == "date" {
        let date = now
            .format("%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)")
            .to_string();
        return (date, EXIT_OK);
    }
    match COMMANDS.iter().find(|(name, _)| *name == command) {
        Some((_, output)) => (output.to_string(), EXIT_OK),
        None => (format!("bash: {command}: command not found"), EXIT_NOT_FOUND),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandHistoryEntry {
    pub command: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Idle,
    Executing,
    Closed,
}

#[derive(Debug, PartialEq)]
pub enum Submission {
    /// Blank input.
    Ignored,
    Cleared,
    /// The owner should close the terminal view.
    Exit,
    /// Echoed to the output; call [`ShellSession::resolve`] for the result.
    Pending,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShellError {
    #[error("shell session is closed")]
    SessionClosed,
    #[error("a command is still executing")]
    Busy,
}

pub struct ShellSession<C: Clock> {
    container: Container,
    clock: C,
    delay: Duration,
    state: ShellState,
    output: Vec<String>,
    transcript: Vec<CommandHistoryEntry>,
    history: Vec<String>,
    cursor: Option<usize>,
    input: String,
    pending: Option<String>,
}

impl<C: Clock> ShellSession<C> {
    /// Open a session on a container of a lab known to `service`.
    pub async fn open<S: LabsService>(
        service: &S,
        lab_id: &LabId,
        container_id: &ContainerId,
        clock: C,
    ) -> Result<Self, LabError> {
        let container = service.get_container(lab_id, container_id).await?;
        Ok(Self::connect(container, clock))
    }

    pub fn connect(container: Container, clock: C) -> Self {
        let output = vec![
            format!("Connected to container: {}", container.name),
            format!("Container ID: {}", container.id),
            format!("Image: {}", container.image),
            "Type 'help' for available commands, 'exit' to return to lab details".to_string(),
        ];
        Self {
            container,
            clock,
            delay: DEFAULT_DELAY,
            state: ShellState::Idle,
            output,
            transcript: Vec::new(),
            history: Vec::new(),
            cursor: None,
            input: String::new(),
            pending: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn state(&self) -> ShellState {
        self.state
    }

    /// Everything displayed since the last `clear`.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Completed commands since the last `clear`.
    pub fn transcript(&self) -> &[CommandHistoryEntry] {
        &self.transcript
    }

    /// Every submitted command, oldest first. `clear` leaves it alone.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    /// Submit a command line.
    pub fn submit(&mut self, line: &str) -> Result<Submission, ShellError> {
        match self.state {
            ShellState::Closed => return Err(ShellError::SessionClosed),
            ShellState::Executing => return Err(ShellError::Busy),
            ShellState::Idle => {}
        }

        let command = line.trim();
        match command {
            "" => Ok(Submission::Ignored),
            "clear" => {
                self.output.clear();
                self.transcript.clear();
                Ok(Submission::Cleared)
            }
            "exit" => {
                self.close();
                Ok(Submission::Exit)
            }
            _ => {
                debug!("exec in {}: {}", self.container.name, command);
                self.output.push(format!("$ {command}"));
                self.history.push(command.to_string());
                self.cursor = None;
                self.input.clear();
                self.pending = Some(command.to_string());
                self.state = ShellState::Executing;
                Ok(Submission::Pending)
            }
        }
    }

    /// Wait out the delay and append the output of the pending command.
    ///
    /// Dropping the returned future before it finishes leaves the command
    /// pending; closing the session discards it.
    pub async fn resolve(&mut self) -> Option<CommandHistoryEntry> {
        let command = self.pending.clone()?;
        self.clock.sleep(self.delay).await;
        self.pending = None;

        let timestamp = self.clock.now();
        let (output, exit_code) = lookup(&command, timestamp);
        self.output.extend(output.lines().map(str::to_string));
        let entry = CommandHistoryEntry {
            command,
            output,
            timestamp,
            exit_code,
        };
        self.transcript.push(entry.clone());
        self.state = ShellState::Idle;
        Some(entry)
    }

    /// Submit and, if needed, resolve in one go.
    pub async fn run(&mut self, line: &str) -> Result<Option<CommandHistoryEntry>, ShellError> {
        match self.submit(line)? {
            Submission::Pending => Ok(self.resolve().await),
            _ => Ok(None),
        }
    }

    /// Arrow up: step back to an older command, stopping at the oldest.
    pub fn history_up(&mut self) -> &str {
        if !self.history.is_empty() {
            let index = match self.cursor {
                None => self.history.len() - 1,
                Some(index) => index.saturating_sub(1),
            };
            self.cursor = Some(index);
            self.input = self.history[index].clone();
        }
        &self.input
    }

    /// Arrow down: step to a newer command, past the newest back to empty input.
    pub fn history_down(&mut self) -> &str {
        if let Some(index) = self.cursor {
            let next = index + 1;
            if next >= self.history.len() {
                self.cursor = None;
                self.input.clear();
            } else {
                self.cursor = Some(next);
                self.input = self.history[next].clone();
            }
        }
        &self.input
    }

    pub fn close(&mut self) {
        self.pending = None;
        self.state = ShellState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.state == ShellState::Closed
    }
}
