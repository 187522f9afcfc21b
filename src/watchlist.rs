use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::error::{Result, SkywatchError};

/// One `KEY:label` line of the watchlist file.
///
/// A key ending in `*` is a glob matched against the callsign; any other key
/// must equal the hex code or the callsign exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchlistEntry {
    pub key: String,
    pub label: String,
}

impl WatchlistEntry {
    pub fn new(key: &str, label: &str) -> Self {
        Self {
            key: key.trim().to_uppercase(),
            label: label.trim().to_string(),
        }
    }

    pub fn is_pattern(&self) -> bool {
        self.key.ends_with('*')
    }

    /// `hex` and `callsign` are expected upper-cased; an empty callsign never matches
    pub fn matches(&self, hex: &str, callsign: &str) -> bool {
        if self.is_pattern() {
            !callsign.is_empty() && glob_match::glob_match(&self.key, callsign)
        } else {
            self.key == hex || (!callsign.is_empty() && self.key == callsign)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Watchlist {
    entries: Vec<WatchlistEntry>,
}

impl Watchlist {
    pub fn new(entries: Vec<WatchlistEntry>) -> Self {
        let mut watchlist = Self::default();
        for entry in entries {
            watchlist.insert(entry);
        }
        watchlist
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read watchlist {}", path.display()))
            .map_err(|e| SkywatchError::config("load watchlist", e))?;
        let watchlist = Self::parse(&contents);
        info!(
            "Loaded {} watchlist entries from {}",
            watchlist.len(),
            path.display()
        );
        Ok(watchlist)
    }

    /// Parse `KEY:label` lines. Blank lines, `#` comments and lines without a
    /// colon are skipped; a repeated key keeps its first position and takes the
    /// last label.
    pub fn parse(contents: &str) -> Self {
        let mut watchlist = Self::default();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, label)) = line.split_once(':') else {
                continue;
            };
            if key.trim().is_empty() {
                continue;
            }
            watchlist.insert(WatchlistEntry::new(key, label));
        }
        watchlist
    }

    fn insert(&mut self, entry: WatchlistEntry) {
        match self.entries.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => existing.label = entry.label,
            None => self.entries.push(entry),
        }
    }

    pub fn entries(&self) -> &[WatchlistEntry] {
        &self.entries
    }

    /// Entries matching this aircraft, in file order
    pub fn matching<'a>(
        &'a self,
        hex: &'a str,
        callsign: &'a str,
    ) -> impl Iterator<Item = &'a WatchlistEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.matches(hex, callsign))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines() {
        let watchlist = Watchlist::parse(
            "# tracked airframes\n\
             a12345 : Governor's jet\n\
             \n\
             dal*:Delta flights\n\
             no colon here\n\
             N628TS:Private: with colon in label\n",
        );

        assert_eq!(
            watchlist.entries(),
            &[
                WatchlistEntry::new("A12345", "Governor's jet"),
                WatchlistEntry::new("DAL*", "Delta flights"),
                WatchlistEntry::new("N628TS", "Private: with colon in label"),
            ]
        );
    }

    #[test]
    fn test_duplicate_key_keeps_position_takes_last_label() {
        let watchlist = Watchlist::parse("A1:first\nB2:other\na1:second\n");
        assert_eq!(watchlist.len(), 2);
        assert_eq!(watchlist.entries()[0], WatchlistEntry::new("A1", "second"));
    }

    #[test]
    fn test_glob_matches_callsign_only() {
        let entry = WatchlistEntry::new("DAL*", "Delta");
        assert!(entry.is_pattern());
        assert!(entry.matches("A00001", "DAL123"));
        assert!(entry.matches("A00001", "DAL"));
        assert!(!entry.matches("A00001", "UAL123"));
        assert!(!entry.matches("DAL999", ""));
    }

    #[test]
    fn test_exact_key_matches_hex_or_callsign() {
        let entry = WatchlistEntry::new("A12345", "tail");
        assert!(entry.matches("A12345", ""));
        assert!(!entry.matches("A123456", ""));
        assert!(!entry.matches("B00000", "A123"));

        let by_callsign = WatchlistEntry::new("N628TS", "callsign");
        assert!(by_callsign.matches("A835AF", "N628TS"));
    }

    #[test]
    fn test_matching_returns_each_entry() {
        let watchlist = Watchlist::parse("DAL*:Delta\nA12345:tail\nUAL*:United\n");
        let matched: Vec<_> = watchlist
            .matching("A12345", "DAL42")
            .map(|e| e.key.as_str())
            .collect();
        assert_eq!(matched, vec!["DAL*", "A12345"]);
    }

    #[test]
    fn test_load_missing_file_is_config_fault() {
        let err = Watchlist::load(Path::new("/nonexistent/watchlist.txt")).unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
