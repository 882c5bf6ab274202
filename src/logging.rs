/// Structured logging for the GEOGLOWS streamflow service
///
/// Wraps `tracing` with the service's conventions: every event carries the
/// data source it concerns and, where relevant, the river reach. Failures
/// are classified before logging so that a bad reach id requested by an
/// agent does not look like a service outage.
///
/// Output always goes to stderr or a file, never stdout: when the binary
/// runs as an MCP server, stdout is the protocol channel.

use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::model::GeoglowsError;

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Geoglows,
    Mcp,
    Agent,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Geoglows => write!(f, "GEOGLOWS"),
            DataSource::Mcp => write!(f, "MCP"),
            DataSource::Agent => write!(f, "AGENT"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - unknown reach, malformed caller input
    Expected,
    /// Unexpected failure - indicates service degradation or an API change
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

/// Installs the global tracing subscriber.
///
/// `config.level` is an `EnvFilter` directive (`info`, `geoglows_service=debug`, ...).
/// With `config.file` set, events are appended there without ANSI colors;
/// otherwise they go to stderr.
pub fn init_logger(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a GEOGLOWS request failure.
pub fn classify_geoglows_failure(err: &GeoglowsError) -> FailureType {
    match err {
        // The service answers 4xx for river ids it does not know about,
        // which is what an agent guessing ids produces.
        GeoglowsError::HttpError(code) if (400..500).contains(code) => FailureType::Expected,
        GeoglowsError::InvalidDate(_) => FailureType::Expected,
        GeoglowsError::HttpError(_) => FailureType::Unexpected,
        GeoglowsError::Request(_) => FailureType::Unexpected,
        // Parse errors suggest API changes or bugs
        GeoglowsError::ParseError(_) => FailureType::Unexpected,
        GeoglowsError::NoDataAvailable(_) => FailureType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a data-service failure with automatic classification
pub fn log_geoglows_failure(river_id: u64, operation: &str, err: &GeoglowsError) {
    let failure_type = classify_geoglows_failure(err);
    let source = DataSource::Geoglows;

    match failure_type {
        FailureType::Expected => {
            tracing::debug!(%source, river_id, failure = %failure_type, "{operation} failed: {err}")
        }
        FailureType::Unexpected => {
            tracing::error!(%source, river_id, failure = %failure_type, "{operation} failed: {err}")
        }
        FailureType::Unknown => {
            tracing::warn!(%source, river_id, failure = %failure_type, "{operation} failed: {err}")
        }
    }
}

// ---------------------------------------------------------------------------
// Verification Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a verification run
pub fn log_verification_summary(total: usize, successful: usize, failed: usize) {
    let source = DataSource::Geoglows;
    let message = format!(
        "Verification complete: {}/{} successful, {} failed",
        successful, total, failed
    );

    if failed == 0 {
        tracing::info!(%source, "{message}");
    } else if successful == 0 {
        tracing::error!(%source, "{message}");
    } else {
        tracing::warn!(%source, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classification() {
        assert_eq!(
            classify_geoglows_failure(&GeoglowsError::HttpError(404)),
            FailureType::Expected
        );
        assert_eq!(
            classify_geoglows_failure(&GeoglowsError::HttpError(503)),
            FailureType::Unexpected
        );
        assert_eq!(
            classify_geoglows_failure(&GeoglowsError::ParseError("bad header".into())),
            FailureType::Unexpected
        );
        assert_eq!(
            classify_geoglows_failure(&GeoglowsError::NoDataAvailable(760701588)),
            FailureType::Unknown
        );
        assert_eq!(
            classify_geoglows_failure(&GeoglowsError::InvalidDate("soon".into())),
            FailureType::Expected
        );
    }

    #[test]
    fn test_source_tags_are_short_uppercase() {
        for source in [DataSource::Geoglows, DataSource::Mcp, DataSource::Agent, DataSource::System] {
            let tag = source.to_string();
            assert!(tag.chars().all(|c| c.is_ascii_uppercase()), "bad tag {tag}");
        }
    }

    #[test]
    fn test_failure_logging_without_subscriber_is_a_no_op() {
        log_geoglows_failure(1, "forecast", &GeoglowsError::HttpError(500));
        log_verification_summary(2, 1, 1);
    }
}
