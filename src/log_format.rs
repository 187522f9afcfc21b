//! Log output for the poller.
//!
//! Default tracing format: `LEVEL span1:span2: target: message`
//! This format:            `LEVEL target: span1:span2: message`
//!
//! Events go to stderr (colored) and, when configured, to a plain-text log
//! file rotated at UTC midnight. The tail of the current file is quoted in the
//! termination notice.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{Event, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

use crate::config::LoggingConfig;

/// Event formatter that puts target before span context
pub struct TargetFirstFormat {
    ansi: bool,
    timestamps: bool,
}

impl TargetFirstFormat {
    pub fn colored() -> Self {
        Self {
            ansi: true,
            timestamps: false,
        }
    }

    /// No escape codes, with a leading UTC timestamp
    pub fn plain() -> Self {
        Self {
            ansi: false,
            timestamps: true,
        }
    }
}

impl<S, N> FormatEvent<S, N> for TargetFirstFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        if self.timestamps {
            write!(
                writer,
                "{} ",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f")
            )?;
        }

        let level = metadata.level();
        if self.ansi {
            let level_style = match *level {
                tracing::Level::ERROR => "\x1b[31m", // Red
                tracing::Level::WARN => "\x1b[33m",  // Yellow
                tracing::Level::INFO => "\x1b[32m",  // Green
                tracing::Level::DEBUG => "\x1b[34m", // Blue
                tracing::Level::TRACE => "\x1b[35m", // Magenta
            };
            write!(writer, "{}{:>5}\x1b[0m ", level_style, level)?;
        } else {
            write!(writer, "{:>5} ", level)?;
        }

        write!(writer, "{}: ", metadata.target())?;

        if let Some(scope) = ctx.event_scope() {
            let mut first = true;
            for span in scope.from_root() {
                if !first {
                    write!(writer, ":")?;
                }
                write!(writer, "{}", span.name())?;
                first = false;
            }
            if !first {
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

fn log_file_parts(path: &Path) -> (PathBuf, String, Option<String>) {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "skywatch".to_string());
    let suffix = path.extension().map(|s| s.to_string_lossy().to_string());
    (dir, prefix, suffix)
}

/// Daily-rotated writer for `path`: `skywatch.log` becomes
/// `skywatch.2026-05-20.log`, and only the newest `keep_files` are kept.
pub fn rolling_file_appender(path: &Path, keep_files: usize) -> Result<RollingFileAppender> {
    let (dir, prefix, suffix) = log_file_parts(path);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let mut builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(keep_files);
    if let Some(suffix) = suffix {
        builder = builder.filename_suffix(suffix);
    }
    builder
        .build(&dir)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// File the rolling writer for `path` uses on `date` (UTC)
pub fn current_log_file(path: &Path, date: NaiveDate) -> PathBuf {
    let (dir, prefix, suffix) = log_file_parts(path);
    let name = match suffix {
        Some(suffix) => format!("{}.{}.{}", prefix, date.format("%Y-%m-%d"), suffix),
        None => format!("{}.{}", prefix, date.format("%Y-%m-%d")),
    };
    dir.join(name)
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match &config.file {
        Some(path) => Some(
            tracing_fmt::layer()
                .event_format(TargetFirstFormat::plain())
                .with_ansi(false)
                .with_writer(rolling_file_appender(path, config.keep_files)?),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_fmt::layer()
                .event_format(TargetFirstFormat::colored())
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}
