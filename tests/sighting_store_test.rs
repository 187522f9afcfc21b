mod common;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use common::TestDatabase;

use skywatch::reference_data::AircraftReference;
use skywatch::sighting_store::SightingQuery;
use skywatch::sightings::AircraftSnapshot;
use skywatch::weather::WeatherReading;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap()
}

fn snapshot(hex: &str) -> AircraftSnapshot {
    AircraftSnapshot {
        flight: Some("DAL123".into()),
        altitude: Some(35_000),
        ground_speed: Some(450),
        squawk: Some("1200".into()),
        ..AircraftSnapshot::new(hex)
    }
}

fn reading(temperature: f64) -> WeatherReading {
    WeatherReading {
        temperature,
        wind_speed: 3.6,
        wind_direction: 240.0,
        visibility: 10.0,
        precipitation: 0.0,
        pressure: 1016.0,
    }
}

#[tokio::test]
async fn test_same_hex_and_timestamp_stored_once() {
    let test_db = TestDatabase::new().expect("Failed to create test database");
    let store = test_db.store();

    assert!(store.record_sighting_at(&snapshot("a1b2c3"), None, now()).await.unwrap());
    assert!(!store.record_sighting_at(&snapshot("A1B2C3"), None, now()).await.unwrap());
    assert!(
        store
            .record_sighting_at(&snapshot("A1B2C3"), None, now() + ChronoDuration::seconds(30))
            .await
            .unwrap()
    );

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.sightings, 2);
    assert_eq!(store.unique_aircraft().await.unwrap(), 1);
}

#[tokio::test]
async fn test_reference_context_is_stored_with_sighting() {
    let test_db = TestDatabase::new().expect("Failed to create test database");
    let store = test_db.store();
    let reference = AircraftReference {
        operator: Some("United States Air Force".into()),
        aircraft_type: Some("Boeing C-17A Globemaster III".into()),
        image_link: Some("https://example.com/c17.jpg".into()),
    };

    store
        .record_sighting_at(&snapshot("AE1234"), Some(&reference), now())
        .await
        .unwrap();

    let rows = store.query_sightings(SightingQuery::default()).await.unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.hex_code, "AE1234");
    assert_eq!(row.operator.as_deref(), Some("United States Air Force"));
    assert_eq!(row.image_url.as_deref(), Some("https://example.com/c17.jpg"));
    assert_eq!(row.squawk_code.as_deref(), Some("1200"));
    assert_eq!(row.observed_at_utc(), now());
}

#[tokio::test]
async fn test_query_filters_by_hex_window_and_limit() {
    let test_db = TestDatabase::new().expect("Failed to create test database");
    let store = test_db.store();

    for minutes in 0..5 {
        let at = now() - ChronoDuration::minutes(minutes * 10);
        store.record_sighting_at(&snapshot("A1B2C3"), None, at).await.unwrap();
        store.record_sighting_at(&snapshot("FFFFFF"), None, at).await.unwrap();
    }

    let only_hex = store
        .query_sightings(SightingQuery {
            hex: Some("a1b2c3".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(only_hex.len(), 5);
    assert!(only_hex.iter().all(|s| s.hex_code == "A1B2C3"));
    assert!(only_hex.windows(2).all(|w| w[0].observed_at >= w[1].observed_at));

    let windowed = store
        .query_sightings(SightingQuery {
            start: Some(now() - ChronoDuration::minutes(20)),
            end: Some(now() - ChronoDuration::minutes(10)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(windowed.len(), 4);

    let limited = store
        .query_sightings(SightingQuery {
            limit: 3,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 3);
    assert_eq!(limited[0].observed_at_utc(), now());
}

#[tokio::test]
async fn test_archive_moves_only_rows_past_cutoff() {
    let test_db = TestDatabase::new().expect("Failed to create test database");
    let store = test_db.store();

    for day in 31..36 {
        let at = now() - ChronoDuration::days(day);
        store.record_sighting_at(&snapshot("OLD001"), None, at).await.unwrap();
    }
    for day in [0, 29] {
        let at = now() - ChronoDuration::days(day);
        store.record_sighting_at(&snapshot("NEW001"), None, at).await.unwrap();
    }
    store
        .record_weather_at(&reading(18.0), now() - ChronoDuration::days(40))
        .await
        .unwrap();
    store.record_weather_at(&reading(21.0), now()).await.unwrap();

    let tables = store
        .archive_older_than_at(ChronoDuration::days(30), 2, now())
        .await
        .unwrap();

    let sightings = &tables[0];
    assert_eq!(sightings.table_name, "aircraft_sightings");
    assert_eq!(sightings.rows_archived, 5);
    assert_eq!(sightings.batches, 3);
    assert_eq!(
        sightings.oldest_remaining,
        Some((now() - ChronoDuration::days(29)).naive_utc())
    );

    let weather = &tables[1];
    assert_eq!(weather.table_name, "weather_conditions");
    assert_eq!(weather.rows_archived, 1);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.sightings, 2);
    assert_eq!(stats.archived_sightings, 5);
    assert_eq!(stats.weather_samples, 1);
    assert_eq!(stats.archived_weather_samples, 1);
    let old_weather = (now() - ChronoDuration::days(40)).naive_utc();
    assert_eq!(stats.archived_weather_range, Some((old_weather, old_weather)));

    let remaining = store.query_sightings(SightingQuery::default()).await.unwrap();
    assert!(remaining.iter().all(|s| s.hex_code == "NEW001"));

    // Nothing left past the cutoff
    let again = store
        .archive_older_than_at(ChronoDuration::days(30), 2, now())
        .await
        .unwrap();
    assert_eq!(again[0].rows_archived, 0);
    assert_eq!(again[0].batches, 0);
}

#[tokio::test]
async fn test_archive_rejects_non_positive_batch_size() {
    let test_db = TestDatabase::new().expect("Failed to create test database");
    let store = test_db.store();

    let err = store
        .archive_older_than_at(ChronoDuration::days(30), 0, now())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "storage");
    assert_eq!(err.operation(), "archive_older_than");
}

#[tokio::test]
async fn test_weather_deduplicated_by_timestamp() {
    let test_db = TestDatabase::new().expect("Failed to create test database");
    let store = test_db.store();

    assert!(store.record_weather_at(&reading(20.0), now()).await.unwrap());
    assert!(!store.record_weather_at(&reading(25.0), now()).await.unwrap());

    let history = store.weather_history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].temperature, 20.0);
}

#[tokio::test]
async fn test_backup_copies_rows_and_refuses_overwrite() {
    let test_db = TestDatabase::new().expect("Failed to create test database");
    let store = test_db.store();
    store.record_sighting_at(&snapshot("A1B2C3"), None, now()).await.unwrap();

    let destination = test_db.path_in("backups/history_copy.db");
    let written = store.backup_to(destination.clone()).await.unwrap();
    assert_eq!(written, destination);
    assert!(destination.exists());

    let copy = skywatch::SightingStore::open(&destination).unwrap();
    assert_eq!(copy.stats().await.unwrap().sightings, 1);
    drop(copy);

    let err = store.backup_to(destination).await.unwrap_err();
    assert_eq!(err.kind(), "storage");
    assert!(format!("{:#}", anyhow::Error::from(err)).contains("already exists"));
}

#[tokio::test]
async fn test_vacuum_and_stats_on_empty_store() {
    let test_db = TestDatabase::new().expect("Failed to create test database");
    let store = test_db.store();

    store.vacuum().await.unwrap();
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.sightings, 0);
    assert_eq!(stats.archived_sightings, 0);
    assert!(stats.sightings_range.is_none());
    assert!(stats.size_bytes > 0);
    assert_eq!(store.recent_unique_aircraft(1000).await.unwrap(), 0);
}

#[tokio::test]
async fn test_recent_unique_aircraft_counts_latest_window() {
    let test_db = TestDatabase::new().expect("Failed to create test database");
    let store = test_db.store();

    for (i, hex) in ["AAAAAA", "BBBBBB", "AAAAAA", "CCCCCC"].iter().enumerate() {
        let at = now() + ChronoDuration::seconds(i as i64 * 30);
        store.record_sighting_at(&snapshot(hex), None, at).await.unwrap();
    }

    // Latest three: CCCCCC, AAAAAA, BBBBBB
    assert_eq!(store.recent_unique_aircraft(3).await.unwrap(), 3);
    // Latest two: CCCCCC, AAAAAA
    assert_eq!(store.recent_unique_aircraft(2).await.unwrap(), 2);
    assert_eq!(store.recent_unique_aircraft(1000).await.unwrap(), 3);
}

#[tokio::test]
async fn test_archive_batch_larger_than_one_statement() {
    let test_db = TestDatabase::new().expect("Failed to create test database");
    let store = test_db.store();

    // 3000 rows at 14 bound values each would not fit in one INSERT
    test_db
        .execute_sql(
            "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 3000) \
             INSERT INTO aircraft_sightings (hex_code, flight_number, squawk_code, observed_at) \
             SELECT printf('%06X', i), 'DAL' || i, '1200', \
                    datetime('2026-07-01 12:00:00', '-' || i || ' seconds') \
             FROM n;",
        )
        .unwrap();
    store.record_sighting_at(&snapshot("NEW001"), None, now()).await.unwrap();

    let tables = store
        .archive_older_than_at(ChronoDuration::days(30), 5000, now())
        .await
        .unwrap();
    assert_eq!(tables[0].rows_archived, 3000);
    assert_eq!(tables[0].batches, 1);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.sightings, 1);
    assert_eq!(stats.archived_sightings, 3000);
}

#[tokio::test]
async fn test_failed_archive_batch_leaves_its_rows_in_place() {
    let test_db = TestDatabase::new().expect("Failed to create test database");
    let store = test_db.store();

    // OLD000 is the oldest, OLD004 the newest past the cutoff
    for (i, day) in [35, 34, 33, 32, 31].into_iter().enumerate() {
        let at = now() - ChronoDuration::days(day);
        store
            .record_sighting_at(&snapshot(&format!("OLD{i:03}")), None, at)
            .await
            .unwrap();
    }
    store.record_sighting_at(&snapshot("NEW001"), None, now()).await.unwrap();
    store
        .record_weather_at(&reading(12.0), now() - ChronoDuration::days(40))
        .await
        .unwrap();

    test_db
        .execute_sql(
            "CREATE TRIGGER reject_archive BEFORE INSERT ON archived_aircraft_sightings \
             WHEN NEW.hex_code = 'OLD002' \
             BEGIN SELECT RAISE(ABORT, 'archive volume full'); END;",
        )
        .unwrap();

    let err = store
        .archive_older_than_at(ChronoDuration::days(30), 2, now())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "storage");
    assert!(format!("{:#}", anyhow::Error::from(err)).contains("archive volume full"));

    // First batch committed, second rolled back whole, weather never reached
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.archived_sightings, 2);
    assert_eq!(stats.sightings, 4);
    assert_eq!(stats.weather_samples, 1);
    assert_eq!(stats.archived_weather_samples, 0);
    for hex in ["OLD002", "OLD003"] {
        let rows = store
            .query_sightings(SightingQuery {
                hex: Some(hex.into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1, "{hex} should still be active");
    }

    test_db.execute_sql("DROP TRIGGER reject_archive;").unwrap();
    let tables = store
        .archive_older_than_at(ChronoDuration::days(30), 2, now())
        .await
        .unwrap();
    assert_eq!(tables[0].rows_archived, 3);
    assert_eq!(tables[1].rows_archived, 1);
    assert_eq!(store.stats().await.unwrap().archived_sightings, 5);
}

#[tokio::test]
async fn test_archive_age_past_the_calendar_is_an_error() {
    let test_db = TestDatabase::new().expect("Failed to create test database");
    let store = test_db.store();

    let err = store
        .archive_older_than_at(ChronoDuration::MAX, 100, now())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "storage");
    assert_eq!(err.operation(), "archive_older_than");
}
