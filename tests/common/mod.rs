//! Common test utilities for store-backed integration tests
//!
//! `TestDatabase` opens a fresh SQLite store (migrations applied) inside a
//! temporary directory, so every test is isolated and tests run in parallel.
//! The directory and everything in it is removed when the value is dropped.
//!
//! # Usage
//!
//! ```no_run
//! use common::TestDatabase;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let test_db = TestDatabase::new().expect("Failed to create test database");
//!     let store = test_db.store();
//! }
//! ```

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use diesel::connection::SimpleConnection;
use diesel::{Connection, SqliteConnection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use skywatch::error::SkywatchError;
use skywatch::feed_client::AircraftFeed;
use skywatch::notifier::Notifier;
use skywatch::sighting_store::SightingStore;
use skywatch::sightings::RawAircraft;

pub struct TestDatabase {
    dir: TempDir,
    store: SightingStore,
}

impl TestDatabase {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let store = SightingStore::open(&dir.path().join("aircraft_history.db"))?;
        Ok(Self { dir, store })
    }

    pub fn store(&self) -> SightingStore {
        self.store.clone()
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn path_in(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Run raw SQL (triggers, schema damage, bulk rows) on a separate connection
    pub fn execute_sql(&self, sql: &str) -> Result<()> {
        let url = self.store.path().to_string_lossy().to_string();
        let mut conn = SqliteConnection::establish(&url)?;
        conn.batch_execute(sql)?;
        Ok(())
    }
}

/// Serves queued snapshots in order, then repeats the last one. An `Err`
/// entry simulates an unreachable receiver for that tick.
pub struct MockFeed {
    snapshots: Mutex<Vec<std::result::Result<Vec<RawAircraft>, String>>>,
    last: Mutex<Vec<RawAircraft>>,
}

impl MockFeed {
    pub fn new(snapshots: Vec<std::result::Result<Vec<RawAircraft>, String>>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into_iter().rev().collect()),
            last: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(aircraft: Vec<RawAircraft>) -> Self {
        Self::new(vec![Ok(aircraft)])
    }
}

#[async_trait]
impl AircraftFeed for MockFeed {
    async fn poll(&self) -> skywatch::Result<Vec<RawAircraft>> {
        let next = self.snapshots.lock().unwrap().pop();
        match next {
            Some(Ok(aircraft)) => {
                *self.last.lock().unwrap() = aircraft.clone();
                Ok(aircraft)
            }
            Some(Err(message)) => Err(SkywatchError::transient_fetch(
                "poll aircraft feed",
                anyhow!(message),
            )),
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Captures every message; optionally fails every send
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn with_subject(&self, subject: &str) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.subject == subject)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        self.sent.lock().unwrap().push(SentMessage {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        if self.fail {
            return Err(anyhow!("SMTP connection refused"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Minimal feed entry as tar1090 would report it
pub fn aircraft(hex: &str, flight: Option<&str>, squawk: Option<&str>) -> RawAircraft {
    RawAircraft {
        hex: hex.to_string(),
        flight: flight.map(|f| format!("{f:<8}")),
        alt_geom: Some(12_025.0),
        gs: Some(431.6),
        track: Some(270.1),
        squawk: squawk.map(str::to_string),
        lat: Some(40.05),
        lon: Some(-82.88),
        ..Default::default()
    }
}
