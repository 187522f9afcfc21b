use anyhow::{Result, anyhow, bail};
use chrono::{Duration as ChronoDuration, Utc};
use std::time::Instant;
use tracing::info;

use skywatch::archive_report::SweepReport;
use skywatch::config::SkywatchConfig;
use skywatch::sighting_store::SightingStore;

/// Handle the archive command: move old rows into the archive tables and
/// vacuum. Overrides fall back to the `[archive]` config section.
pub async fn handle_archive(
    config: &SkywatchConfig,
    days: Option<i64>,
    batch_size: Option<i64>,
) -> Result<()> {
    let days = days.unwrap_or(config.archive.max_age_days);
    let batch_size = batch_size.unwrap_or(config.archive.batch_size);
    if days < 0 {
        bail!("--days must not be negative");
    }
    if batch_size <= 0 {
        bail!("--batch-size must be greater than zero");
    }
    let max_age = ChronoDuration::try_days(days)
        .ok_or_else(|| anyhow!("--days {days} is out of range"))?;

    let store = SightingStore::open(&config.database.path)?;
    let now = Utc::now();
    let timer = Instant::now();
    let mut report = SweepReport::new(now);

    info!(
        "Archiving rows older than {} days in batches of {}",
        days, batch_size
    );
    report.tables = store
        .archive_older_than_at(max_age, batch_size, now)
        .await?;

    if let Err(e) = store.vacuum().await {
        report.vacuum_error = Some(e.to_string());
    }
    report.stats = store.stats().await.ok();
    report.total_duration_secs = timer.elapsed().as_secs_f64();

    print!("{}", report.to_text());
    Ok(())
}
