//! error kinds for the three boundaries: remote fetch, payload parsing, local storage.

use thiserror::Error;

/// the device shadow could not be fetched this cycle
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("no iotda auth token configured")]
    MissingCredentials,

    #[error("shadow request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("shadow request returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("shadow response was not valid json: {0}")]
    Decode(String),
}

/// the snapshot arrived but a numeric property could not be read
#[derive(Error, Debug, Clone, PartialEq)]
#[error("service {service}: property {field} is not numeric ({value})")]
pub struct ParseError {
    pub service: String,
    pub field: String,
    pub value: String,
}

/// open/read/write failure on the sqlite file
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("store task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}
