use std::io;
use thiserror::Error;

/// Failure conditions that abort startup or ingest. Malformed map data is
/// never reported through this type; it is logged and skipped so that a
/// query can always run against whatever was ingested.
#[derive(Error, Debug)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("pbf error: {0}")]
    Pbf(#[from] osmpbfreader::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("snapshot error: {0}")]
    Snapshot(String),
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
