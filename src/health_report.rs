use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt::Write;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::archive_report::{format_count, format_duration};
use crate::sighting_store::StoreStats;

/// Resource usage of this process
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessUsage {
    pub pid: u32,
    pub cpu_percent: f32,
    pub memory_mb: f64,
    pub memory_percent: f64,
}

/// Keeps one `System` alive so CPU usage is measured between samples
pub struct ProcessSampler {
    system: System,
    pid: Option<Pid>,
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    pub fn sample(&mut self) -> ProcessUsage {
        let pid_number = std::process::id();
        let Some(pid) = self.pid else {
            return ProcessUsage {
                pid: pid_number,
                ..Default::default()
            };
        };

        self.system.refresh_memory();
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        let total = self.system.total_memory();
        match self.system.process(pid) {
            Some(process) => {
                let rss = process.memory();
                ProcessUsage {
                    pid: pid_number,
                    cpu_percent: process.cpu_usage(),
                    memory_mb: rss as f64 / (1024.0 * 1024.0),
                    memory_percent: if total > 0 {
                        rss as f64 / total as f64 * 100.0
                    } else {
                        0.0
                    },
                }
            }
            None => ProcessUsage {
                pid: pid_number,
                ..Default::default()
            },
        }
    }
}

/// Periodic operational status, sent unconditionally to the health recipient
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub usage: ProcessUsage,
    pub aircraft_tracking: usize,
    pub recent_unique_aircraft: Option<i64>,
    pub recent_window: i64,
    pub stats: Option<StoreStats>,
    pub cooldowns_tracked: usize,
}

impl HealthReport {
    pub fn subject(&self) -> &'static str {
        "SkyWatch Health Check"
    }

    pub fn to_text(&self, tz: Tz) -> String {
        let mut out = String::new();
        let uptime = (self.generated_at - self.started_at).num_seconds().max(0) as f64;

        let _ = writeln!(
            out,
            "Time: {}",
            self.generated_at
                .with_timezone(&tz)
                .format("%Y-%m-%d %H:%M:%S %Z")
        );
        let _ = writeln!(out, "PID: {}", self.usage.pid);
        let _ = writeln!(out, "Uptime: {}", format_duration(uptime));
        let _ = writeln!(out, "CPU Usage: {:.1}%", self.usage.cpu_percent);
        let _ = writeln!(
            out,
            "Memory Usage: {:.1} MB ({:.1}%)",
            self.usage.memory_mb, self.usage.memory_percent
        );
        let _ = writeln!(out, "Aircraft Tracking: {}", self.aircraft_tracking);
        match self.recent_unique_aircraft {
            Some(n) => {
                let _ = writeln!(
                    out,
                    "Unique Aircraft (last {} sightings): {}",
                    self.recent_window,
                    format_count(n)
                );
            }
            None => {
                let _ = writeln!(out, "Unique Aircraft: unavailable");
            }
        }
        match &self.stats {
            Some(stats) => {
                let _ = writeln!(out, "Current Sightings: {}", format_count(stats.sightings));
                let _ = writeln!(
                    out,
                    "Archived Sightings: {}",
                    format_count(stats.archived_sightings)
                );
                let _ = writeln!(out, "Database Size: {:.2} MB", stats.size_mb());
            }
            None => {
                let _ = writeln!(out, "Database: stats unavailable");
            }
        }
        let _ = write!(out, "Cooldowns Tracked: {}", self.cooldowns_tracked);
        out
    }
}

/// First report of a run, sent before the first tick
#[derive(Debug, Clone)]
pub struct StartupReport {
    pub started_at: DateTime<Utc>,
    pub host: String,
    pub version: String,
    pub working_dir: String,
    pub pid: u32,
    pub database: String,
    pub watchlist_entries: usize,
    pub reference_entries: usize,
    pub notifier: &'static str,
}

impl StartupReport {
    pub fn collect(
        started_at: DateTime<Utc>,
        version: &str,
        database: &str,
        watchlist_entries: usize,
        reference_entries: usize,
        notifier: &'static str,
    ) -> Self {
        Self {
            started_at,
            host: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            version: version.to_string(),
            working_dir: std::env::current_dir()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            database: database.to_string(),
            watchlist_entries,
            reference_entries,
            notifier,
        }
    }

    pub fn subject(&self) -> &'static str {
        "SkyWatch Program Started"
    }

    pub fn to_text(&self, tz: Tz) -> String {
        format!(
            "SkyWatch started at {}\n\
             Host: {}\n\
             Version: {}\n\
             Working Directory: {}\n\
             PID: {}\n\
             Database: {}\n\
             Watchlist Entries: {}\n\
             Reference Entries: {}\n\
             Notifier: {}",
            self.started_at
                .with_timezone(&tz)
                .format("%Y-%m-%d %H:%M:%S %Z"),
            self.host,
            self.version,
            self.working_dir,
            self.pid,
            self.database,
            self.watchlist_entries,
            self.reference_entries,
            self.notifier
        )
    }
}
