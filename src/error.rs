use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AirError {
    #[error("{0} not set")]
    #[diagnostic(help("export a Civitai API token, e.g. `export CIVIT_API=<token>`"))]
    MissingCredential(String),

    #[error("invalid AIR URN: {0:?}")]
    InvalidAirUrn(String),

    #[error("No write permission: {path}: {message}")]
    NotWritable { path: PathBuf, message: String },

    #[error("failed to read metadata document at {path}: {message}")]
    DocumentRead { path: PathBuf, message: String },

    #[error("failed to parse metadata document: {0}")]
    DocumentParse(String),

    #[error("failed to write metadata document at {path}: {message}")]
    DocumentWrite { path: PathBuf, message: String },

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("server returned status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
