use anyhow::Result;
use chrono::NaiveDateTime;

use skywatch::config::SkywatchConfig;
use skywatch::sighting_store::SightingStore;

fn describe_range(range: Option<(NaiveDateTime, NaiveDateTime)>) -> String {
    match range {
        Some((oldest, newest)) => format!(
            "{} .. {}",
            oldest.format("%Y-%m-%d %H:%M:%S"),
            newest.format("%Y-%m-%d %H:%M:%S")
        ),
        None => "empty".to_string(),
    }
}

/// Handle the stats command
pub async fn handle_stats(config: &SkywatchConfig) -> Result<()> {
    let store = SightingStore::open(&config.database.path)?;
    let stats = store.stats().await?;
    let unique = store.unique_aircraft().await?;

    println!("Database: {}", store.path().display());
    println!("Size: {:.2} MB", stats.size_mb());
    println!(
        "Sightings: {} ({} unique aircraft), UTC range {}",
        stats.sightings,
        unique,
        describe_range(stats.sightings_range)
    );
    println!(
        "Archived sightings: {}, UTC range {}",
        stats.archived_sightings,
        describe_range(stats.archived_sightings_range)
    );
    println!(
        "Weather samples: {}, UTC range {}",
        stats.weather_samples,
        describe_range(stats.weather_range)
    );
    println!(
        "Archived weather samples: {}, UTC range {}",
        stats.archived_weather_samples,
        describe_range(stats.archived_weather_range)
    );

    if let Some(latest) = store.weather_history(1).await?.first() {
        println!(
            "Latest weather ({} UTC): {:.1} °C, wind {:.1} m/s from {:.0}°, visibility {:.1} km, {:.0} hPa",
            latest.observed_at.format("%Y-%m-%d %H:%M"),
            latest.temperature,
            latest.wind_speed,
            latest.wind_direction,
            latest.visibility,
            latest.pressure
        );
    }
    Ok(())
}
