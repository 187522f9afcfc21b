use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::path::PathBuf;

use crate::archiver::TableArchiveMetrics;
use crate::sighting_store::StoreStats;

pub(crate) fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

pub(crate) fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub(crate) fn format_count(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if n < 0 { format!("-{grouped}") } else { grouped }
}

/// Outcome of one backup → archive → vacuum → stats sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub total_duration_secs: f64,
    pub backup_path: Option<PathBuf>,
    /// A retry that kept the backup from an earlier failed attempt
    pub backup_reused: bool,
    pub tables: Vec<TableArchiveMetrics>,
    /// Vacuum is best-effort; a failure is noted but does not fail the sweep
    pub vacuum_error: Option<String>,
    pub stats: Option<StoreStats>,
    pub cooldowns_evicted: usize,
    /// Backup or archive failure that aborted the sweep
    pub failure: Option<String>,
}

impl SweepReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            ..Default::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn rows_archived(&self) -> usize {
        self.tables.iter().map(|t| t.rows_archived).sum()
    }

    pub fn subject(&self) -> &'static str {
        if self.succeeded() {
            "SkyWatch Database Cleanup"
        } else {
            "SkyWatch Database Cleanup FAILED"
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let status = if self.succeeded() { "SUCCESS" } else { "FAILED" };

        let _ = writeln!(out, "Database cleanup {status}");
        let _ = writeln!(
            out,
            "Started: {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(out, "Duration: {}", format_duration(self.total_duration_secs));

        if let Some(failure) = &self.failure {
            let _ = writeln!(out, "Error: {failure}");
        }

        match &self.backup_path {
            Some(path) => {
                let _ = writeln!(out, "Backup: {}", path.display());
            }
            None if self.backup_reused => {
                let _ = writeln!(out, "Backup: kept from the previous attempt");
            }
            None => {
                let _ = writeln!(out, "Backup: not written");
            }
        }

        for table in &self.tables {
            let oldest = table
                .oldest_remaining
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "none".to_string());
            let _ = writeln!(
                out,
                "Archived {}: {} rows in {} batches ({}), oldest remaining {}",
                table.table_name,
                format_count(table.rows_archived as i64),
                table.batches,
                format_duration(table.duration_secs),
                oldest
            );
        }

        if let Some(err) = &self.vacuum_error {
            let _ = writeln!(out, "Vacuum failed: {err}");
        }

        if let Some(stats) = &self.stats {
            let _ = writeln!(out, "Current sightings: {}", format_count(stats.sightings));
            let _ = writeln!(
                out,
                "Archived sightings: {}",
                format_count(stats.archived_sightings)
            );
            let _ = writeln!(
                out,
                "Weather samples: {} ({} archived)",
                format_count(stats.weather_samples),
                format_count(stats.archived_weather_samples)
            );
            let _ = writeln!(out, "Database size: {}", format_file_size(stats.size_bytes));
        }

        if self.cooldowns_evicted > 0 {
            let _ = writeln!(out, "Expired cooldowns dropped: {}", self.cooldowns_evicted);
        }

        out
    }
}
