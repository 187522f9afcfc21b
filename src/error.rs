use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Fault taxonomy at the edges of the engine.
///
/// Internals use `anyhow` with context; the store, the feed and weather clients,
/// the notifier and config loading map into one of these so the poll loop can
/// decide what is fatal (only `Config`, and only at startup).
#[derive(Debug, Error)]
pub enum SkywatchError {
    /// Feed or weather endpoint unreachable, timed out or returned garbage.
    #[error("fetch failed ({operation}): {source}")]
    TransientFetch {
        operation: String,
        #[source]
        source: BoxError,
    },

    /// Any persistence failure other than a duplicate-key insert.
    #[error("storage failed ({operation}): {source}")]
    Storage {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("notification failed ({operation}): {source}")]
    Notification {
        operation: String,
        #[source]
        source: BoxError,
    },

    /// Missing or unreadable reference data, or an unparsable config file.
    #[error("configuration error ({operation}): {source}")]
    Config {
        operation: String,
        #[source]
        source: BoxError,
    },
}

impl SkywatchError {
    pub fn transient_fetch(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::TransientFetch {
            operation: operation.into(),
            source: boxed(source),
        }
    }

    pub fn storage(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Storage {
            operation: operation.into(),
            source: boxed(source),
        }
    }

    pub fn notification(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Notification {
            operation: operation.into(),
            source: boxed(source),
        }
    }

    pub fn config(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Config {
            operation: operation.into(),
            source: boxed(source),
        }
    }

    /// Short label used in log fields and metric names
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientFetch { .. } => "transient_fetch",
            Self::Storage { .. } => "storage",
            Self::Notification { .. } => "notification",
            Self::Config { .. } => "config",
        }
    }

    pub fn operation(&self) -> &str {
        match self {
            Self::TransientFetch { operation, .. }
            | Self::Storage { operation, .. }
            | Self::Notification { operation, .. }
            | Self::Config { operation, .. } => operation,
        }
    }
}

fn boxed(source: impl Into<anyhow::Error>) -> BoxError {
    let err: anyhow::Error = source.into();
    err.into()
}

pub type Result<T> = std::result::Result<T, SkywatchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_display_includes_operation_and_source() {
        let err = SkywatchError::storage("record_sighting", anyhow!("disk I/O error"));
        assert_eq!(
            err.to_string(),
            "storage failed (record_sighting): disk I/O error"
        );
        assert_eq!(err.kind(), "storage");
        assert_eq!(err.operation(), "record_sighting");
    }

    #[test]
    fn test_source_chain_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "watchlist.txt");
        let err = SkywatchError::config("load watchlist", io);
        let source = std::error::Error::source(&err).expect("source should be set");
        assert!(source.to_string().contains("watchlist.txt"));
    }
}
