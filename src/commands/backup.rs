use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;

use skywatch::config::SkywatchConfig;
use skywatch::sighting_store::{SightingStore, default_backup_path};

/// Handle the backup command. Refuses to overwrite an existing file.
pub async fn handle_backup(config: &SkywatchConfig, destination: Option<PathBuf>) -> Result<()> {
    let store = SightingStore::open(&config.database.path)?;
    let destination = destination.unwrap_or_else(|| {
        default_backup_path(
            store.path(),
            config.archive.backup_dir.as_deref(),
            Utc::now(),
        )
    });

    let written = store.backup_to(destination).await?;
    println!("Backup written to {}", written.display());
    Ok(())
}
