use anyhow::{Context, anyhow, bail};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::dsl::{count_distinct, max, min};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sql_types::Text;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::archiver::{self, TableArchiveMetrics};
use crate::error::{Result, SkywatchError};
use crate::reference_data::AircraftReference;
use crate::schema::{
    aircraft_sightings, archived_aircraft_sightings, archived_weather_conditions,
    weather_conditions,
};
use crate::sightings::{AircraftSnapshot, NewSighting, Sighting};
use crate::weather::{NewWeatherCondition, WeatherCondition, WeatherReading};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
pub type SqlitePooledConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

/// WAL keeps the history viewer from blocking the poller; the busy timeout
/// covers the brief write lock held by each archive batch.
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000; PRAGMA synchronous = NORMAL;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Filters for [`SightingStore::query_sightings`]; all set filters must hold
#[derive(Debug, Clone, PartialEq)]
pub struct SightingQuery {
    pub hex: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl Default for SightingQuery {
    fn default() -> Self {
        Self {
            hex: None,
            start: None,
            end: None,
            limit: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub sightings: i64,
    pub archived_sightings: i64,
    pub weather_samples: i64,
    pub archived_weather_samples: i64,
    /// Main database file plus its WAL
    pub size_bytes: u64,
    pub sightings_range: Option<(NaiveDateTime, NaiveDateTime)>,
    pub archived_sightings_range: Option<(NaiveDateTime, NaiveDateTime)>,
    pub weather_range: Option<(NaiveDateTime, NaiveDateTime)>,
    pub archived_weather_range: Option<(NaiveDateTime, NaiveDateTime)>,
}

impl StoreStats {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Durable, deduplicated sighting and weather history in one SQLite file
#[derive(Clone)]
pub struct SightingStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SightingStore {
    /// Open (creating if needed) the store and apply pending migrations
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_inner(path).map_err(|e| SkywatchError::storage("open store", e))
    }

    fn open_inner(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(4)
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)
            .with_context(|| format!("Failed to open database {}", path.display()))?;

        let mut conn = pool.get().context("Failed to get database connection")?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow!("Failed to run migrations: {e}"))?;
        if !applied.is_empty() {
            info!("Applied {} migrations to {}", applied.len(), path.display());
        }

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a diesel closure on a pooled connection off the async runtime
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| anyhow!("Failed to get database connection: {}", e))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| SkywatchError::storage(operation, e))?
        .map_err(|e| SkywatchError::storage(operation, e))
    }

    pub async fn record_sighting(
        &self,
        snapshot: &AircraftSnapshot,
        reference: Option<&AircraftReference>,
    ) -> Result<bool> {
        self.record_sighting_at(snapshot, reference, Utc::now()).await
    }

    /// Insert unless (hex, observed_at) already exists. Returns whether a row was written.
    pub async fn record_sighting_at(
        &self,
        snapshot: &AircraftSnapshot,
        reference: Option<&AircraftReference>,
        observed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let row = NewSighting::from_snapshot(snapshot, reference, observed_at);
        let inserted = self
            .with_conn("record_sighting", move |conn| {
                Ok(diesel::insert_or_ignore_into(aircraft_sightings::table)
                    .values(&row)
                    .execute(conn)?)
            })
            .await?;

        if inserted == 0 {
            debug!(hex = %snapshot.hex, "Duplicate sighting ignored");
        }
        Ok(inserted > 0)
    }

    pub async fn record_weather(&self, reading: &WeatherReading) -> Result<bool> {
        self.record_weather_at(reading, Utc::now()).await
    }

    pub async fn record_weather_at(
        &self,
        reading: &WeatherReading,
        observed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let row = NewWeatherCondition::from_reading(reading, observed_at);
        let inserted = self
            .with_conn("record_weather", move |conn| {
                Ok(diesel::insert_or_ignore_into(weather_conditions::table)
                    .values(&row)
                    .execute(conn)?)
            })
            .await?;
        Ok(inserted > 0)
    }

    /// Newest first, capped at `query.limit`
    pub async fn query_sightings(&self, query: SightingQuery) -> Result<Vec<Sighting>> {
        self.with_conn("query_sightings", move |conn| {
            let mut q = aircraft_sightings::table
                .select(Sighting::as_select())
                .into_boxed();
            if let Some(hex) = &query.hex {
                q = q.filter(aircraft_sightings::hex_code.eq(hex.trim().to_uppercase()));
            }
            if let Some(start) = query.start {
                q = q.filter(aircraft_sightings::observed_at.ge(start.naive_utc()));
            }
            if let Some(end) = query.end {
                q = q.filter(aircraft_sightings::observed_at.le(end.naive_utc()));
            }
            Ok(q.order((
                aircraft_sightings::observed_at.desc(),
                aircraft_sightings::id.desc(),
            ))
            .limit(query.limit.max(0))
            .load(conn)?)
        })
        .await
    }

    /// Most recent weather samples, newest first
    pub async fn weather_history(&self, limit: i64) -> Result<Vec<WeatherCondition>> {
        self.with_conn("weather_history", move |conn| {
            Ok(weather_conditions::table
                .order(weather_conditions::observed_at.desc())
                .limit(limit.max(0))
                .select(WeatherCondition::as_select())
                .load(conn)?)
        })
        .await
    }

    /// Distinct hex codes among the `limit` most recent sightings
    pub async fn recent_unique_aircraft(&self, limit: i64) -> Result<i64> {
        self.with_conn("recent_unique_aircraft", move |conn| {
            let recent = aircraft_sightings::table
                .select(aircraft_sightings::hex_code)
                .order((
                    aircraft_sightings::observed_at.desc(),
                    aircraft_sightings::id.desc(),
                ))
                .limit(limit.max(0))
                .load::<String>(conn)?;
            let mut unique: Vec<String> = recent;
            unique.sort_unstable();
            unique.dedup();
            Ok(unique.len() as i64)
        })
        .await
    }

    /// Move everything older than `max_age` into the archive tables,
    /// sightings first, then weather.
    pub async fn archive_older_than(
        &self,
        max_age: ChronoDuration,
        batch_size: i64,
    ) -> Result<Vec<TableArchiveMetrics>> {
        self.archive_older_than_at(max_age, batch_size, Utc::now())
            .await
    }

    pub async fn archive_older_than_at(
        &self,
        max_age: ChronoDuration,
        batch_size: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TableArchiveMetrics>> {
        let archived_at = now.naive_utc();
        self.with_conn("archive_older_than", move |conn| {
            let cutoff = now
                .checked_sub_signed(max_age)
                .ok_or_else(|| anyhow!("archive age {max_age} reaches past the earliest date"))?
                .naive_utc();
            let sightings = archiver::archive::<Sighting>(conn, cutoff, archived_at, batch_size)?;
            let weather =
                archiver::archive::<WeatherCondition>(conn, cutoff, archived_at, batch_size)?;
            Ok(vec![sightings, weather])
        })
        .await
    }

    pub async fn vacuum(&self) -> Result<()> {
        self.with_conn("vacuum", |conn| {
            diesel::sql_query("VACUUM").execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Consistent copy of the store via `VACUUM INTO`. Never overwrites an
    /// existing file; returns the path written.
    pub async fn backup(&self, destination: Option<PathBuf>) -> Result<PathBuf> {
        let destination =
            destination.unwrap_or_else(|| default_backup_path(&self.path, None, Utc::now()));
        self.backup_to(destination).await
    }

    pub async fn backup_to(&self, destination: PathBuf) -> Result<PathBuf> {
        self.with_conn("backup", move |conn| {
            if destination.exists() {
                bail!("Backup target {} already exists", destination.display());
            }
            if let Some(parent) = destination.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            diesel::sql_query("VACUUM INTO ?")
                .bind::<Text, _>(destination.to_string_lossy().to_string())
                .execute(conn)
                .with_context(|| format!("VACUUM INTO {} failed", destination.display()))?;
            info!("Database backed up to {}", destination.display());
            Ok(destination)
        })
        .await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let path = self.path.clone();
        self.with_conn("stats", move |conn| {
            let sightings = aircraft_sightings::table.count().get_result::<i64>(conn)?;
            let archived_sightings = archived_aircraft_sightings::table
                .count()
                .get_result::<i64>(conn)?;
            let weather_samples = weather_conditions::table.count().get_result::<i64>(conn)?;
            let archived_weather_samples = archived_weather_conditions::table
                .count()
                .get_result::<i64>(conn)?;

            let sightings_range = range(
                aircraft_sightings::table
                    .select((
                        min(aircraft_sightings::observed_at),
                        max(aircraft_sightings::observed_at),
                    ))
                    .first(conn)?,
            );
            let archived_sightings_range = range(
                archived_aircraft_sightings::table
                    .select((
                        min(archived_aircraft_sightings::observed_at),
                        max(archived_aircraft_sightings::observed_at),
                    ))
                    .first(conn)?,
            );
            let weather_range = range(
                weather_conditions::table
                    .select((
                        min(weather_conditions::observed_at),
                        max(weather_conditions::observed_at),
                    ))
                    .first(conn)?,
            );
            let archived_weather_range = range(
                archived_weather_conditions::table
                    .select((
                        min(archived_weather_conditions::observed_at),
                        max(archived_weather_conditions::observed_at),
                    ))
                    .first(conn)?,
            );

            Ok(StoreStats {
                sightings,
                archived_sightings,
                weather_samples,
                archived_weather_samples,
                size_bytes: on_disk_size(&path),
                sightings_range,
                archived_sightings_range,
                weather_range,
                archived_weather_range,
            })
        })
        .await
    }

    /// Distinct aircraft in the active table
    pub async fn unique_aircraft(&self) -> Result<i64> {
        self.with_conn("unique_aircraft", |conn| {
            Ok(aircraft_sightings::table
                .select(count_distinct(aircraft_sightings::hex_code))
                .get_result::<i64>(conn)?)
        })
        .await
    }
}

fn range(
    bounds: (Option<NaiveDateTime>, Option<NaiveDateTime>),
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    match bounds {
        (Some(lo), Some(hi)) => Some((lo, hi)),
        _ => None,
    }
}

fn on_disk_size(path: &Path) -> u64 {
    let file_len = |p: &Path| std::fs::metadata(p).map(|m| m.len()).unwrap_or(0);
    let mut wal = path.as_os_str().to_owned();
    wal.push("-wal");
    file_len(path) + file_len(Path::new(&wal))
}

/// `<dir>/<stem>_backup_<YYYYmmdd_HHMMSS>.db`, where `dir` defaults to the
/// store's own directory
pub fn default_backup_path(store_path: &Path, dir: Option<&Path>, now: DateTime<Utc>) -> PathBuf {
    let stem = store_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "skywatch".to_string());
    let file_name = format!("{}_backup_{}.db", stem, now.format("%Y%m%d_%H%M%S"));
    match dir.or_else(|| store_path.parent()) {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}
