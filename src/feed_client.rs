//! Aircraft feed abstraction.
//!
//! The poll loop only sees [`AircraftFeed`]:
//! - Production: tar1090 `aircraft.json` over HTTP
//! - Testing: canned snapshots

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SkywatchError};
use crate::sightings::RawAircraft;

/// Source of the current aircraft picture
#[async_trait]
pub trait AircraftFeed: Send + Sync {
    /// Every aircraft currently reported, in feed order
    async fn poll(&self) -> Result<Vec<RawAircraft>>;
}

/// Body of tar1090's `data/aircraft.json`
#[derive(Debug, Deserialize)]
pub struct AircraftJson {
    #[serde(default)]
    pub now: Option<f64>,
    #[serde(default)]
    pub messages: Option<u64>,
    #[serde(default)]
    pub aircraft: Vec<RawAircraft>,
}

#[derive(Clone)]
pub struct Tar1090Client {
    client: Client,
    url: String,
    timeout: Duration,
}

impl Tar1090Client {
    pub fn new(client: Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> anyhow::Result<AircraftJson> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("Failed to reach aircraft feed at {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Aircraft feed returned HTTP {}", status));
        }

        response
            .json::<AircraftJson>()
            .await
            .context("Failed to parse aircraft.json")
    }
}

#[async_trait]
impl AircraftFeed for Tar1090Client {
    async fn poll(&self) -> Result<Vec<RawAircraft>> {
        let body = self
            .fetch()
            .await
            .map_err(|e| SkywatchError::transient_fetch("poll aircraft feed", e))?;
        debug!(
            "Feed returned {} aircraft ({} messages)",
            body.aircraft.len(),
            body.messages.unwrap_or_default()
        );
        Ok(body.aircraft)
    }
}
