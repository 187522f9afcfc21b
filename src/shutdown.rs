use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::archive_report::format_duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// SIGINT/SIGTERM listener. Handlers are registered on construction, so a
/// signal delivered while a tick is running is still observed afterwards.
pub struct ShutdownListener {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownListener {
    #[cfg(unix)]
    pub fn install() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?,
            terminate: signal(SignalKind::terminate())
                .context("Failed to install SIGTERM handler")?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> Result<Self> {
        Ok(Self {})
    }

    /// Resolves on the next signal. Cancel-safe.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> ShutdownSignal {
        tokio::select! {
            _ = self.interrupt.recv() => ShutdownSignal::Interrupt,
            _ = self.terminate.recv() => ShutdownSignal::Terminate,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> ShutdownSignal {
        let _ = tokio::signal::ctrl_c().await;
        ShutdownSignal::Interrupt
    }
}

/// Best-effort notice sent to the health recipient before exiting
#[derive(Debug, Clone)]
pub struct TerminationNotice {
    pub signal: ShutdownSignal,
    pub at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub user: String,
    pub origin: String,
    pub last_log_lines: Vec<String>,
}

impl TerminationNotice {
    pub fn collect(
        signal: ShutdownSignal,
        at: DateTime<Utc>,
        started_at: DateTime<Utc>,
        log_file: Option<&Path>,
        tail: usize,
    ) -> Self {
        let env = |key: &str| std::env::var(key).ok();
        Self {
            signal,
            at,
            started_at,
            user: env("USER")
                .or_else(|| env("LOGNAME"))
                .unwrap_or_else(|| "unknown".to_string()),
            origin: session_origin(env("SSH_CLIENT").or_else(|| env("SSH_CONNECTION"))),
            last_log_lines: log_file
                .and_then(|path| tail_lines(path, tail).ok())
                .unwrap_or_default(),
        }
    }

    pub fn subject(&self) -> &'static str {
        "SkyWatch Program Terminated"
    }

    pub fn to_text(&self, tz: Tz) -> String {
        let uptime = (self.at - self.started_at).num_seconds().max(0) as f64;
        let logs = if self.last_log_lines.is_empty() {
            "(no log lines available)".to_string()
        } else {
            self.last_log_lines.join("\n")
        };
        format!(
            "SkyWatch received {} and is shutting down.\n\
             Time: {}\n\
             Uptime: {}\n\
             User: {}\n\
             Origin: {}\n\
             \n\
             Last log lines:\n{}",
            self.signal,
            self.at.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z"),
            format_duration(uptime),
            self.user,
            self.origin,
            logs
        )
    }
}

/// Client address of an SSH session (`SSH_CLIENT` is "ip port port"), or "local"
fn session_origin(ssh_client: Option<String>) -> String {
    ssh_client
        .as_deref()
        .and_then(|s| s.split_whitespace().next())
        .map(str::to_string)
        .unwrap_or_else(|| "local".to_string())
}

/// Last `n` lines of a text file
pub fn tail_lines(path: &Path, n: usize) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    let mut lines = std::collections::VecDeque::with_capacity(n + 1);
    for line in BufReader::new(file).lines() {
        lines.push_back(line?);
        if lines.len() > n {
            lines.pop_front();
        }
    }
    Ok(lines.into())
}
