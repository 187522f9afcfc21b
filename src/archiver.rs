use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

use crate::schema::{
    aircraft_sightings, archived_aircraft_sightings, archived_weather_conditions,
    weather_conditions,
};
use crate::sightings::Sighting;
use crate::weather::WeatherCondition;

/// Rows per INSERT/DELETE statement. An archived sighting binds 14 values, so
/// this stays well under SQLite's 32766 bound-parameter limit for any batch size.
pub const ROWS_PER_STATEMENT: usize = 500;

/// Trait for active-table rows that rotate into an archive table.
///
/// Each table provides its queries; [`archive`] drives the batched,
/// transactional move shared by all of them.
pub trait Archivable: Sized + Send + 'static {
    /// Name of the active table (e.g., "aircraft_sightings")
    fn table_name() -> &'static str;

    fn id(&self) -> i32;

    /// Up to `batch_size` rows observed before `cutoff`, oldest first
    fn load_batch(
        conn: &mut SqliteConnection,
        cutoff: NaiveDateTime,
        batch_size: i64,
    ) -> QueryResult<Vec<Self>>;

    fn insert_archive_copies(
        conn: &mut SqliteConnection,
        batch: &[Self],
        archived_at: NaiveDateTime,
    ) -> QueryResult<usize>;

    fn delete_ids(conn: &mut SqliteConnection, ids: &[i32]) -> QueryResult<usize>;

    fn oldest_active(conn: &mut SqliteConnection) -> QueryResult<Option<NaiveDateTime>>;
}

/// Metrics returned from archiving one table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableArchiveMetrics {
    pub table_name: String,
    pub rows_archived: usize,
    pub batches: usize,
    pub duration_secs: f64,
    /// Oldest `observed_at` still in the active table after the run
    pub oldest_remaining: Option<NaiveDateTime>,
}

/// Move every row older than `cutoff` into the archive table.
///
/// Each batch is its own immediate transaction: select, insert copies stamped
/// with `archived_at`, delete the same ids. Inserts and deletes are split into
/// statements of [`ROWS_PER_STATEMENT`] rows inside that transaction. A
/// failing batch rolls back and aborts the remaining batches; batches already
/// committed stay archived.
pub fn archive<T: Archivable>(
    conn: &mut SqliteConnection,
    cutoff: NaiveDateTime,
    archived_at: NaiveDateTime,
    batch_size: i64,
) -> Result<TableArchiveMetrics> {
    if batch_size <= 0 {
        bail!("archive batch size must be positive, got {batch_size}");
    }

    info!("Archiving {} observed before {}", T::table_name(), cutoff);
    let start = Instant::now();
    let mut metrics = TableArchiveMetrics {
        table_name: T::table_name().to_string(),
        ..Default::default()
    };

    loop {
        let moved = conn
            .immediate_transaction::<_, anyhow::Error, _>(|conn| {
                let batch = T::load_batch(conn, cutoff, batch_size)?;
                if batch.is_empty() {
                    return Ok(0);
                }

                let mut inserted = 0;
                for chunk in batch.chunks(ROWS_PER_STATEMENT) {
                    inserted += T::insert_archive_copies(conn, chunk, archived_at)?;
                }
                let ids: Vec<i32> = batch.iter().map(T::id).collect();
                let mut deleted = 0;
                for chunk in ids.chunks(ROWS_PER_STATEMENT) {
                    deleted += T::delete_ids(conn, chunk)?;
                }

                if inserted != batch.len() || deleted != batch.len() {
                    bail!(
                        "batch mismatch for {}: selected {}, archived {}, deleted {}",
                        T::table_name(),
                        batch.len(),
                        inserted,
                        deleted
                    );
                }
                Ok(batch.len())
            })
            .with_context(|| {
                format!(
                    "Failed to archive batch {} of {}",
                    metrics.batches + 1,
                    T::table_name()
                )
            })?;

        if moved == 0 {
            break;
        }

        metrics.rows_archived += moved;
        metrics.batches += 1;
        metrics::counter!("skywatch.archive.rows_archived_total", "table" => T::table_name())
            .increment(moved as u64);
        debug!(
            "Archived batch {} of {} ({} rows)",
            metrics.batches,
            T::table_name(),
            moved
        );
    }

    metrics.oldest_remaining = T::oldest_active(conn)
        .with_context(|| format!("Failed to read oldest {} row", T::table_name()))?;
    metrics.duration_secs = start.elapsed().as_secs_f64();

    info!(
        "Archived {} {} rows in {} batches ({:.2}s)",
        metrics.rows_archived,
        T::table_name(),
        metrics.batches,
        metrics.duration_secs
    );
    Ok(metrics)
}

impl Archivable for Sighting {
    fn table_name() -> &'static str {
        "aircraft_sightings"
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn load_batch(
        conn: &mut SqliteConnection,
        cutoff: NaiveDateTime,
        batch_size: i64,
    ) -> QueryResult<Vec<Self>> {
        aircraft_sightings::table
            .filter(aircraft_sightings::observed_at.lt(cutoff))
            .order((
                aircraft_sightings::observed_at.asc(),
                aircraft_sightings::id.asc(),
            ))
            .limit(batch_size)
            .select(Sighting::as_select())
            .load(conn)
    }

    fn insert_archive_copies(
        conn: &mut SqliteConnection,
        batch: &[Self],
        archived_at: NaiveDateTime,
    ) -> QueryResult<usize> {
        let copies: Vec<_> = batch.iter().map(|s| s.to_archived(archived_at)).collect();
        diesel::insert_into(archived_aircraft_sightings::table)
            .values(&copies)
            .execute(conn)
    }

    fn delete_ids(conn: &mut SqliteConnection, ids: &[i32]) -> QueryResult<usize> {
        diesel::delete(aircraft_sightings::table.filter(aircraft_sightings::id.eq_any(ids)))
            .execute(conn)
    }

    fn oldest_active(conn: &mut SqliteConnection) -> QueryResult<Option<NaiveDateTime>> {
        aircraft_sightings::table
            .select(diesel::dsl::min(aircraft_sightings::observed_at))
            .first(conn)
    }
}

impl Archivable for WeatherCondition {
    fn table_name() -> &'static str {
        "weather_conditions"
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn load_batch(
        conn: &mut SqliteConnection,
        cutoff: NaiveDateTime,
        batch_size: i64,
    ) -> QueryResult<Vec<Self>> {
        weather_conditions::table
            .filter(weather_conditions::observed_at.lt(cutoff))
            .order(weather_conditions::observed_at.asc())
            .limit(batch_size)
            .select(WeatherCondition::as_select())
            .load(conn)
    }

    fn insert_archive_copies(
        conn: &mut SqliteConnection,
        batch: &[Self],
        archived_at: NaiveDateTime,
    ) -> QueryResult<usize> {
        let copies: Vec<_> = batch.iter().map(|w| w.to_archived(archived_at)).collect();
        diesel::insert_into(archived_weather_conditions::table)
            .values(&copies)
            .execute(conn)
    }

    fn delete_ids(conn: &mut SqliteConnection, ids: &[i32]) -> QueryResult<usize> {
        diesel::delete(weather_conditions::table.filter(weather_conditions::id.eq_any(ids)))
            .execute(conn)
    }

    fn oldest_active(conn: &mut SqliteConnection) -> QueryResult<Option<NaiveDateTime>> {
        weather_conditions::table
            .select(diesel::dsl::min(weather_conditions::observed_at))
            .first(conn)
    }
}
