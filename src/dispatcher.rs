use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::alert_message::build_alert_message;
use crate::config::CooldownConfig;
use crate::cooldown::AlertCooldownTracker;
use crate::error::SkywatchError;
use crate::matchers::{AlertClass, CandidateAlert};
use crate::notifier::Notifier;

/// Cooldown window per alert class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CooldownPolicy {
    pub squawk: ChronoDuration,
    pub watchlist: ChronoDuration,
}

impl CooldownPolicy {
    pub fn window_for(&self, class: AlertClass) -> ChronoDuration {
        match class {
            AlertClass::Squawk => self.squawk,
            AlertClass::Watchlist | AlertClass::MilitaryCallsign => self.watchlist,
        }
    }

    pub fn longest(&self) -> ChronoDuration {
        self.squawk.max(self.watchlist)
    }
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self::from(&CooldownConfig::default())
    }
}

/// Out-of-range windows saturate instead of panicking
fn window(secs: i64) -> ChronoDuration {
    ChronoDuration::try_seconds(secs.max(0)).unwrap_or(ChronoDuration::MAX)
}

impl From<&CooldownConfig> for CooldownPolicy {
    fn from(config: &CooldownConfig) -> Self {
        Self {
            squawk: window(config.squawk_secs),
            watchlist: window(config.watchlist_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// Still inside the cooldown window
    Suppressed,
    /// Cooldown recorded but the transport failed; not retried
    SendFailed,
}

/// Rate-limits candidate alerts and hands the survivors to the notifier
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    recipient: String,
    policy: CooldownPolicy,
    cooldowns: AlertCooldownTracker,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, recipient: impl Into<String>, policy: CooldownPolicy) -> Self {
        Self {
            notifier,
            recipient: recipient.into(),
            policy,
            cooldowns: AlertCooldownTracker::new(),
        }
    }

    pub fn cooldowns(&self) -> &AlertCooldownTracker {
        &self.cooldowns
    }

    pub fn policy(&self) -> CooldownPolicy {
        self.policy
    }

    /// The fire is recorded before sending, so a failing transport cannot
    /// turn into an alert storm on every tick.
    pub async fn dispatch(&mut self, alert: &CandidateAlert, now: DateTime<Utc>) -> DispatchOutcome {
        let key = alert.key();
        let window = self.policy.window_for(alert.class);

        if !self.cooldowns.may_fire(&key, now, window) {
            debug!(hex = %alert.hex, key = %key, "Alert suppressed by cooldown");
            metrics::counter!("skywatch.alerts.suppressed_total", "class" => alert.class.as_str())
                .increment(1);
            return DispatchOutcome::Suppressed;
        }

        self.cooldowns.record_fire(key.clone(), now);
        let body = build_alert_message(alert);

        match self
            .notifier
            .send(&self.recipient, alert.class.subject(), &body)
            .await
        {
            Ok(()) => {
                info!(
                    hex = %alert.hex,
                    key = %key,
                    notifier = self.notifier.name(),
                    "{} sent: {}",
                    alert.class.subject(),
                    alert.detail
                );
                metrics::counter!("skywatch.alerts.dispatched_total", "class" => alert.class.as_str())
                    .increment(1);
                DispatchOutcome::Sent
            }
            Err(e) => {
                let fault = SkywatchError::notification("dispatch alert", e);
                warn!(hex = %alert.hex, key = %key, "{}", fault);
                metrics::counter!("skywatch.alerts.failed_total", "class" => alert.class.as_str())
                    .increment(1);
                DispatchOutcome::SendFailed
            }
        }
    }

    /// Forget cooldowns that can no longer suppress anything
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        match now.checked_sub_signed(self.policy.longest()) {
            Some(cutoff) => self.cooldowns.evict_older_than(cutoff),
            None => 0,
        }
    }
}
