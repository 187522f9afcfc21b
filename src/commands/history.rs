use anyhow::{Result, anyhow, bail};
use chrono::{Duration as ChronoDuration, Utc};

use skywatch::config::SkywatchConfig;
use skywatch::history::{render_history, summary_lines};
use skywatch::sighting_store::{SightingQuery, SightingStore};

/// Print recent sightings, newest first
pub async fn handle_history(
    config: &SkywatchConfig,
    hex: Option<String>,
    days: i64,
    limit: i64,
) -> Result<()> {
    if days < 0 {
        bail!("--days must not be negative");
    }
    let start = ChronoDuration::try_days(days)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| anyhow!("--days {days} reaches past the earliest representable date"))?;

    let tz = config.display_timezone()?;
    let store = SightingStore::open(&config.database.path)?;

    let sightings = store
        .query_sightings(SightingQuery {
            hex,
            start: Some(start),
            end: None,
            limit,
        })
        .await?;

    if sightings.is_empty() {
        println!("No sightings in the last {days} days");
        return Ok(());
    }

    println!("{}", render_history(&sightings, tz));
    println!("{}", summary_lines(&sightings));
    Ok(())
}
