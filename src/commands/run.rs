use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use skywatch::config::SkywatchConfig;
use skywatch::dispatcher::{AlertDispatcher, CooldownPolicy};
use skywatch::error::SkywatchError;
use skywatch::feed_client::Tar1090Client;
use skywatch::instance_lock::InstanceLock;
use skywatch::matchers::ConditionMatchers;
use skywatch::notifier::{EmailConfig, EmailNotifier, LogNotifier, Notifier};
use skywatch::poller::{LoopSettings, PollLoop};
use skywatch::reference_data::ReferenceTable;
use skywatch::shutdown::ShutdownListener;
use skywatch::sighting_store::SightingStore;
use skywatch::watchlist::Watchlist;
use skywatch::weather_client::OpenWeatherClient;

/// Handle the run command: poll until SIGINT/SIGTERM, then exit cleanly
pub async fn handle_run(config: SkywatchConfig, version: &str) -> Result<()> {
    let settings = LoopSettings::from_config(&config)?;

    let _lock = InstanceLock::for_store(&config.database.path)
        .map_err(|e| SkywatchError::config("acquire instance lock", e))?;

    // Handlers go in before the first tick so no signal is lost
    let mut listener = ShutdownListener::install()?;

    if let Some(port) = config.metrics.port {
        let handle = skywatch::metrics::init_metrics()?;
        tokio::spawn(async move {
            if let Err(e) = skywatch::metrics::serve_metrics(handle, port).await {
                error!("Metrics server stopped: {:#}", e);
            }
        });
    }
    skywatch::metrics::initialize_run_metrics();

    let store = SightingStore::open(&config.database.path)?;
    let reference = Arc::new(ReferenceTable::load_files(&config.reference.files)?);
    let watchlist = match &config.reference.watchlist {
        Some(path) => Watchlist::load(path)?,
        None => Watchlist::default(),
    };
    let matchers = ConditionMatchers::new(
        config.alerts.squawk_codes.clone(),
        config.alerts.military_prefixes.clone(),
        watchlist,
    );

    let notifier: Arc<dyn Notifier> = match EmailConfig::from_env()? {
        Some(email) => {
            if config.notify.alert_recipient.is_none() {
                return Err(SkywatchError::config(
                    "notify.alert_recipient",
                    anyhow!("SMTP is configured but no alert recipient is set (ALERT_EMAIL_TO)"),
                )
                .into());
            }
            let notifier = EmailNotifier::new(&email)
                .map_err(|e| SkywatchError::config("build SMTP transport", e))?;
            Arc::new(notifier)
        }
        None => {
            warn!("SMTP_SERVER not set, alerts and reports will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let http = reqwest::Client::builder()
        .user_agent(format!("skywatch/{version}"))
        .build()
        .context("Failed to build HTTP client")?;

    let feed = Tar1090Client::new(
        http.clone(),
        config.feed.url.clone(),
        Duration::from_secs(config.feed.timeout_secs),
    );
    info!(
        "SkyWatch {} watching {} (store {})",
        version,
        feed.url(),
        config.database.path.display()
    );
    let dispatcher = AlertDispatcher::new(
        notifier.clone(),
        config.notify.alert_recipient.clone().unwrap_or_default(),
        CooldownPolicy::from(&config.cooldowns),
    );

    let mut poll_loop = PollLoop::new(
        store,
        Box::new(feed),
        matchers,
        reference,
        dispatcher,
        notifier,
        settings,
    );

    match &config.weather.api_key {
        Some(api_key) => {
            poll_loop = poll_loop.with_weather(Box::new(OpenWeatherClient::new(
                http,
                config.weather.base_url.clone(),
                api_key.clone(),
                config.weather.latitude,
                config.weather.longitude,
                Duration::from_secs(config.weather.timeout_secs),
            )));
        }
        None => info!("OPENWEATHER_API_KEY not set, weather sampling disabled"),
    }

    poll_loop.send_startup_report(version).await;

    let signal = poll_loop.run(&mut listener).await;
    poll_loop.send_termination_notice(signal, Utc::now()).await;

    info!("Shutdown complete");
    Ok(())
}
