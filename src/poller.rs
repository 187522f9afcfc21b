use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::archive_report::SweepReport;
use crate::config::SkywatchConfig;
use crate::dispatcher::{AlertDispatcher, DispatchOutcome};
use crate::error::{Result, SkywatchError};
use crate::feed_client::AircraftFeed;
use crate::health_report::{HealthReport, ProcessSampler, StartupReport};
use crate::log_format::current_log_file;
use crate::matchers::ConditionMatchers;
use crate::notifier::Notifier;
use crate::reference_data::ReferenceTable;
use crate::shutdown::{ShutdownListener, ShutdownSignal, TerminationNotice};
use crate::sighting_store::{SightingStore, default_backup_path};
use crate::weather_client::WeatherSource;

/// Sightings inspected for the health report's unique-aircraft figure
const RECENT_SIGHTINGS_WINDOW: i64 = 1000;

/// When each periodic task last ran. Owned by the loop and threaded through
/// `run_scheduled` by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerState {
    pub last_weather: Option<DateTime<Utc>>,
    /// Last sweep that completed its backup and archive steps
    pub last_sweep: DateTime<Utc>,
    pub last_health: DateTime<Utc>,
    /// Set while sweeps are failing; cleared by the next successful one
    pub last_sweep_failure: Option<DateTime<Utc>>,
    /// Most recent backup written by a sweep
    pub last_backup: Option<DateTime<Utc>>,
}

impl SchedulerState {
    /// Weather is due immediately; the sweep and the health report wait one
    /// interval (the startup report stands in for the first health report).
    pub fn started(now: DateTime<Utc>) -> Self {
        Self {
            last_weather: None,
            last_sweep: now,
            last_health: now,
            last_sweep_failure: None,
            last_backup: None,
        }
    }

    pub fn weather_due(&self, now: DateTime<Utc>, interval: ChronoDuration) -> bool {
        self.last_weather.is_none_or(|last| now - last >= interval)
    }

    /// One interval after the last good sweep, and no sooner than `retry`
    /// after a failed attempt
    pub fn sweep_due(
        &self,
        now: DateTime<Utc>,
        interval: ChronoDuration,
        retry: ChronoDuration,
    ) -> bool {
        now - self.last_sweep >= interval
            && self.last_sweep_failure.is_none_or(|failed| now - failed >= retry)
    }

    /// A backup younger than one sweep interval is reused by retries
    pub fn backup_current(&self, now: DateTime<Utc>, interval: ChronoDuration) -> bool {
        self.last_backup.is_some_and(|taken| now - taken < interval)
    }

    pub fn health_due(&self, now: DateTime<Utc>, interval: ChronoDuration) -> bool {
        now - self.last_health >= interval
    }
}

/// Pacing, retention and reporting knobs for the loop
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub tick: Duration,
    pub weather_interval: ChronoDuration,
    pub sweep_interval: ChronoDuration,
    pub sweep_retry: ChronoDuration,
    pub health_interval: ChronoDuration,
    pub archive_max_age: ChronoDuration,
    pub archive_batch_size: i64,
    pub backup_dir: Option<PathBuf>,
    pub health_recipient: Option<String>,
    pub log_file: Option<PathBuf>,
    pub tail_lines: usize,
    pub timezone: Tz,
}

impl LoopSettings {
    pub fn from_config(config: &SkywatchConfig) -> Result<Self> {
        Ok(Self::with_timezone(config, config.display_timezone()?))
    }

    pub fn with_timezone(config: &SkywatchConfig, timezone: Tz) -> Self {
        let schedule = &config.schedule;
        Self {
            tick: Duration::from_secs(schedule.tick_secs),
            weather_interval: seconds(schedule.weather_interval_secs),
            sweep_interval: seconds(schedule.sweep_interval_secs),
            sweep_retry: seconds(schedule.sweep_retry_secs),
            health_interval: seconds(schedule.health_interval_secs),
            archive_max_age: ChronoDuration::try_days(config.archive.max_age_days.max(0))
                .unwrap_or(ChronoDuration::MAX),
            archive_batch_size: config.archive.batch_size,
            backup_dir: config.archive.backup_dir.clone(),
            health_recipient: config.health_recipient().map(str::to_string),
            log_file: config.logging.file.clone(),
            tail_lines: config.logging.tail_lines,
            timezone,
        }
    }
}

/// Saturates instead of panicking on values `validate` would reject
fn seconds(secs: u64) -> ChronoDuration {
    i64::try_from(secs)
        .ok()
        .and_then(ChronoDuration::try_seconds)
        .unwrap_or(ChronoDuration::MAX)
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::with_timezone(&SkywatchConfig::default(), chrono_tz::America::New_York)
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub fetch_failed: bool,
    pub aircraft_seen: usize,
    pub sightings_stored: usize,
    pub duplicates: usize,
    pub military: usize,
    pub alerts_sent: usize,
    pub alerts_suppressed: usize,
    pub alerts_failed: usize,
    pub storage_errors: usize,
}

/// The tracking engine: fetch, match, alert, record, then run whatever
/// periodic work is due.
pub struct PollLoop {
    store: SightingStore,
    feed: Box<dyn AircraftFeed>,
    weather: Option<Box<dyn WeatherSource>>,
    matchers: ConditionMatchers,
    reference: Arc<ReferenceTable>,
    dispatcher: AlertDispatcher,
    ops_notifier: Arc<dyn Notifier>,
    settings: LoopSettings,
    sampler: ProcessSampler,
    started_at: DateTime<Utc>,
    last_aircraft_count: usize,
}

impl PollLoop {
    pub fn new(
        store: SightingStore,
        feed: Box<dyn AircraftFeed>,
        matchers: ConditionMatchers,
        reference: Arc<ReferenceTable>,
        dispatcher: AlertDispatcher,
        ops_notifier: Arc<dyn Notifier>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            store,
            feed,
            weather: None,
            matchers,
            reference,
            dispatcher,
            ops_notifier,
            settings,
            sampler: ProcessSampler::new(),
            started_at: Utc::now(),
            last_aircraft_count: 0,
        }
    }

    pub fn with_weather(mut self, source: Box<dyn WeatherSource>) -> Self {
        self.weather = Some(source);
        self
    }

    pub fn store(&self) -> &SightingStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_aircraft_count(&self) -> usize {
        self.last_aircraft_count
    }

    /// Run until SIGINT/SIGTERM. The step in flight always completes; the
    /// signal is only observed between steps and during the tick sleep.
    pub async fn run(&mut self, listener: &mut ShutdownListener) -> ShutdownSignal {
        let mut state = SchedulerState::started(self.started_at);
        info!(
            "Polling every {}s (weather {}s, sweep {}s, health {}s)",
            self.settings.tick.as_secs(),
            self.settings.weather_interval.num_seconds(),
            self.settings.sweep_interval.num_seconds(),
            self.settings.health_interval.num_seconds()
        );

        loop {
            let summary = self.run_tick(Utc::now()).await;
            debug!(?summary, "Tick complete");

            state = self.run_scheduled(state, Utc::now()).await;

            tokio::select! {
                signal = listener.recv() => {
                    info!("Received {}, shutting down", signal);
                    return signal;
                }
                _ = tokio::time::sleep(self.settings.tick) => {}
            }
        }
    }

    /// Fetch once and process every aircraft in the snapshot. A fetch failure
    /// skips aircraft work for this tick; nothing here propagates.
    #[tracing::instrument(skip(self), fields(now = %now))]
    pub async fn run_tick(&mut self, now: DateTime<Utc>) -> TickSummary {
        metrics::counter!("skywatch.ticks_total").increment(1);
        let mut summary = TickSummary::default();

        let fetch_start = Instant::now();
        let aircraft = match self.feed.poll().await {
            Ok(aircraft) => aircraft,
            Err(e) => {
                warn!("{}", e);
                metrics::counter!("skywatch.feed.errors_total").increment(1);
                summary.fetch_failed = true;
                return summary;
            }
        };
        metrics::histogram!("skywatch.feed.fetch_duration_seconds")
            .record(fetch_start.elapsed().as_secs_f64());

        for raw in aircraft {
            let Some(snapshot) = raw.normalize() else {
                debug!("Skipping aircraft without hex code");
                continue;
            };
            summary.aircraft_seen += 1;

            let context = self.reference.get(&snapshot.hex);
            let evaluation = self.matchers.evaluate(&snapshot, context);

            if let Some(military) = &evaluation.military {
                info!(
                    hex = %snapshot.hex,
                    callsign = snapshot.callsign(),
                    prefix = %military.prefix,
                    "Military callsign sighted"
                );
                metrics::counter!("skywatch.military.sightings_total").increment(1);
                summary.military += 1;
            }

            for candidate in &evaluation.candidates {
                match self.dispatcher.dispatch(candidate, now).await {
                    DispatchOutcome::Sent => summary.alerts_sent += 1,
                    DispatchOutcome::Suppressed => summary.alerts_suppressed += 1,
                    DispatchOutcome::SendFailed => summary.alerts_failed += 1,
                }
            }

            match self.store.record_sighting_at(&snapshot, context, now).await {
                Ok(true) => {
                    metrics::counter!("skywatch.sightings.recorded_total").increment(1);
                    summary.sightings_stored += 1;
                }
                Ok(false) => {
                    metrics::counter!("skywatch.sightings.duplicates_total").increment(1);
                    summary.duplicates += 1;
                }
                Err(e) => {
                    error!(hex = %snapshot.hex, "{}", e);
                    metrics::counter!("skywatch.sightings.storage_errors_total").increment(1);
                    summary.storage_errors += 1;
                }
            }
        }

        self.last_aircraft_count = summary.aircraft_seen;
        metrics::gauge!("skywatch.aircraft.tracking").set(summary.aircraft_seen as f64);
        metrics::gauge!("skywatch.cooldowns.tracked").set(self.dispatcher.cooldowns().len() as f64);

        if summary.aircraft_seen > 0 {
            info!(
                "Tracking {} aircraft ({} stored, {} alerts sent)",
                summary.aircraft_seen, summary.sightings_stored, summary.alerts_sent
            );
        }
        summary
    }

    /// Run whichever periodic tasks are due and return the updated markers
    pub async fn run_scheduled(
        &mut self,
        mut state: SchedulerState,
        now: DateTime<Utc>,
    ) -> SchedulerState {
        if state.weather_due(now, self.settings.weather_interval) {
            self.record_weather(now).await;
            state.last_weather = Some(now);
        }

        if state.sweep_due(now, self.settings.sweep_interval, self.settings.sweep_retry) {
            let take_backup = !state.backup_current(now, self.settings.sweep_interval);
            let report = self.sweep(now, take_backup).await;
            if report.backup_path.is_some() {
                state.last_backup = Some(now);
            }
            if report.succeeded() {
                state.last_sweep = now;
                state.last_sweep_failure = None;
            } else {
                state.last_sweep_failure = Some(now);
            }
        }

        if state.health_due(now, self.settings.health_interval) {
            self.send_health_report(now).await;
            state.last_health = now;
        }

        state
    }

    async fn record_weather(&self, now: DateTime<Utc>) {
        let Some(source) = &self.weather else {
            return;
        };

        match source.current().await {
            Ok(Some(reading)) => match self.store.record_weather_at(&reading, now).await {
                Ok(_) => {
                    metrics::counter!("skywatch.weather.samples_total").increment(1);
                    debug!(
                        temperature = reading.temperature,
                        wind_speed = reading.wind_speed,
                        "Weather recorded"
                    );
                }
                Err(e) => error!("{}", e),
            },
            Ok(None) => {
                warn!("Weather response was missing required fields");
                metrics::counter!("skywatch.weather.errors_total").increment(1);
            }
            Err(e) => {
                warn!("{}", e);
                metrics::counter!("skywatch.weather.errors_total").increment(1);
            }
        }
    }

    /// Backup, archive, vacuum, stats, then cooldown eviction. A backup or
    /// archive failure aborts the sweep and is reported to the health recipient.
    pub async fn run_sweep(&mut self, now: DateTime<Utc>) -> SweepReport {
        self.sweep(now, true).await
    }

    /// Retries of a failed sweep skip the backup while the last one is current
    #[tracing::instrument(skip(self), fields(now = %now))]
    async fn sweep(&mut self, now: DateTime<Utc>, take_backup: bool) -> SweepReport {
        let timer = Instant::now();
        let mut report = SweepReport::new(now);
        metrics::counter!("skywatch.sweeps_total").increment(1);
        info!("Starting database cleanup");

        if take_backup {
            let destination =
                default_backup_path(self.store.path(), self.settings.backup_dir.as_deref(), now);
            match self.store.backup_to(destination).await {
                Ok(path) => report.backup_path = Some(path),
                Err(e) => {
                    report.failure = Some(e.to_string());
                    return self.finish_sweep(report, timer).await;
                }
            }
        } else {
            info!("Backup from the previous attempt is still current, not taking another");
            report.backup_reused = true;
        }

        match self
            .store
            .archive_older_than_at(
                self.settings.archive_max_age,
                self.settings.archive_batch_size,
                now,
            )
            .await
        {
            Ok(tables) => report.tables = tables,
            Err(e) => {
                report.failure = Some(e.to_string());
                return self.finish_sweep(report, timer).await;
            }
        }

        if let Err(e) = self.store.vacuum().await {
            warn!("{}", e);
            report.vacuum_error = Some(e.to_string());
        }

        match self.store.stats().await {
            Ok(stats) => {
                info!(
                    "Current sightings: {}, archived sightings: {}, database size: {:.2} MB",
                    stats.sightings,
                    stats.archived_sightings,
                    stats.size_mb()
                );
                report.stats = Some(stats);
            }
            Err(e) => warn!("{}", e),
        }

        report.cooldowns_evicted = self.dispatcher.evict_expired(now);
        self.finish_sweep(report, timer).await
    }

    async fn finish_sweep(&self, mut report: SweepReport, timer: Instant) -> SweepReport {
        report.total_duration_secs = timer.elapsed().as_secs_f64();

        if report.succeeded() {
            info!(
                "Database cleanup completed: {} rows archived in {:.1}s",
                report.rows_archived(),
                report.total_duration_secs
            );
        } else {
            error!(
                "Database cleanup failed: {}",
                report.failure.as_deref().unwrap_or("unknown error")
            );
            metrics::counter!("skywatch.sweeps.failed_total").increment(1);
            self.notify_ops(report.subject(), &report.to_text()).await;
        }
        report
    }

    #[tracing::instrument(skip(self), fields(now = %now))]
    pub async fn send_health_report(&mut self, now: DateTime<Utc>) -> HealthReport {
        let recent_unique_aircraft = match self
            .store
            .recent_unique_aircraft(RECENT_SIGHTINGS_WINDOW)
            .await
        {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("{}", e);
                None
            }
        };
        let stats = match self.store.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("{}", e);
                None
            }
        };

        let report = HealthReport {
            generated_at: now,
            started_at: self.started_at,
            usage: self.sampler.sample(),
            aircraft_tracking: self.last_aircraft_count,
            recent_unique_aircraft,
            recent_window: RECENT_SIGHTINGS_WINDOW,
            stats,
            cooldowns_tracked: self.dispatcher.cooldowns().len(),
        };

        self.notify_ops(report.subject(), &report.to_text(self.settings.timezone))
            .await;
        metrics::counter!("skywatch.health_reports_total").increment(1);
        report
    }

    pub async fn send_startup_report(&self, version: &str) {
        let report = StartupReport::collect(
            self.started_at,
            version,
            &self.store.path().display().to_string(),
            self.matchers.watchlist().len(),
            self.reference.len(),
            self.ops_notifier.name(),
        );
        info!("{}", report.subject());
        self.notify_ops(report.subject(), &report.to_text(self.settings.timezone))
            .await;
    }

    pub async fn send_termination_notice(&self, signal: ShutdownSignal, at: DateTime<Utc>) {
        let log_file = self
            .settings
            .log_file
            .as_deref()
            .map(|base| current_log_file(base, at.date_naive()));
        let notice = TerminationNotice::collect(
            signal,
            at,
            self.started_at,
            log_file.as_deref(),
            self.settings.tail_lines,
        );
        self.notify_ops(notice.subject(), &notice.to_text(self.settings.timezone))
            .await;
    }

    /// Operational notices are best-effort: failures are logged and dropped
    async fn notify_ops(&self, subject: &str, body: &str) {
        let Some(recipient) = self.settings.health_recipient.as_deref() else {
            debug!("No health recipient configured, not sending '{}'", subject);
            return;
        };
        if let Err(e) = self.ops_notifier.send(recipient, subject, body).await {
            warn!("{}", SkywatchError::notification(subject, e));
        }
    }
}
