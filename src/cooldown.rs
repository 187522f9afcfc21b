use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::fmt;

/// Identity of a rate-limited alert: (alert class, hex code).
///
/// The class is `squawk` or `watchlist:<entry key>`, so every watchlist entry
/// cools down independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub class: String,
    pub hex: String,
}

impl AlertKey {
    pub fn new(class: impl Into<String>, hex: &str) -> Self {
        Self {
            class: class.into(),
            hex: hex.trim().to_uppercase(),
        }
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.class, self.hex)
    }
}

/// Last-fired instants per alert key. In-memory only; a restart forgets them.
///
/// Checking never mutates state; the dispatcher records a fire explicitly.
#[derive(Debug, Clone, Default)]
pub struct AlertCooldownTracker {
    last_fired: HashMap<AlertKey, DateTime<Utc>>,
}

impl AlertCooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the key never fired or `now - last >= window`
    pub fn may_fire(&self, key: &AlertKey, now: DateTime<Utc>, window: ChronoDuration) -> bool {
        match self.last_fired.get(key) {
            None => true,
            Some(last) => now.signed_duration_since(*last) >= window,
        }
    }

    pub fn record_fire(&mut self, key: AlertKey, now: DateTime<Utc>) {
        self.last_fired.insert(key, now);
    }

    pub fn last_fired(&self, key: &AlertKey) -> Option<DateTime<Utc>> {
        self.last_fired.get(key).copied()
    }

    /// Drop entries last fired before `cutoff`, returning how many were removed
    pub fn evict_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.last_fired.len();
        self.last_fired.retain(|_, last| *last >= cutoff);
        before - self.last_fired.len()
    }

    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }
}
