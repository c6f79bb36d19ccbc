use thiserror::Error;

/// A backend call failed: network, auth, or a malformed response. Fatal for
/// the scan that issued it.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status} for {url}: {body}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
        body: String,
    },

    #[error("could not decode backend response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("invalid backend base URL '{0}'")]
    BaseUrl(String),

    #[error("backend '{backend}' has no credentials configured")]
    MissingCredentials { backend: String },
}

/// Test-run records carried neither outcome statistics nor aggregate counts.
/// Not fatal: the caller logs it and reports zero counts.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("test run records carried neither outcome statistics nor aggregate counts")]
pub struct DataShapeError;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid polling window '{0}': expected a positive integer count of hours")]
    InvalidWindow(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A full scan across all backends produced nothing. A normally non-empty
    /// backend answering with zero builds means a call failed while reporting
    /// success, which the caller must be able to tell apart from "nothing
    /// changed".
    #[error("scan returned no build summaries")]
    EmptyResult,

    #[error("scan worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("config declares no backends")]
    NoBackends,
}
