//! SkyWatch - ADS-B receiver watcher
//!
//! Polls a local tar1090 feed, keeps a deduplicated sighting history in
//! SQLite, raises squawk and watchlist alerts with per-aircraft cooldowns, and
//! runs the periodic weather, archival and health-report work.

pub mod alert_message;
pub mod archive_report;
pub mod archiver;
pub mod config;
pub mod cooldown;
pub mod dispatcher;
pub mod error;
pub mod feed_client;
pub mod health_report;
pub mod history;
pub mod instance_lock;
pub mod log_format;
pub mod matchers;
pub mod metrics;
pub mod notifier;
pub mod poller;
pub mod reference_data;
pub mod schema;
pub mod shutdown;
pub mod sighting_store;
pub mod sightings;
pub mod watchlist;
pub mod weather;
pub mod weather_client;

pub use dispatcher::{AlertDispatcher, CooldownPolicy, DispatchOutcome};
pub use error::{Result, SkywatchError};
pub use matchers::{AlertClass, CandidateAlert, ConditionMatchers};
pub use poller::{LoopSettings, PollLoop, SchedulerState, TickSummary};
pub use sighting_store::{SightingQuery, SightingStore, StoreStats};
pub use sightings::{AircraftSnapshot, RawAircraft, Sighting};
