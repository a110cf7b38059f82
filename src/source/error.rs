//! Fetch failures, split by whether a retry could plausibly help.

use thiserror::Error;

/// A failure while fetching observations for one station.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no client id configured; set FROST_CLIENT_ID or pass one explicitly")]
    MissingClientId,

    #[error("failed to build the HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    /// A retry may succeed: timeouts, connection failures, throttling, server
    /// errors.
    #[error("transient failure fetching station {station}: {reason}")]
    Transient {
        station: String,
        reason: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// A retry will not help: bad request, bad credentials, unknown station.
    #[error("permanent failure fetching station {station}: {reason}")]
    Permanent {
        station: String,
        reason: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("could not decode the response for station {station}")]
    Decode {
        station: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
