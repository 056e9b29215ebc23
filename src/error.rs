//! Error types.
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to reach a servable file. Every variant is answered with 404; the
/// path and the underlying cause are only ever logged.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("no such file `{}`", .path.display())]
    NotFound { path: PathBuf },
    #[error("`{}` is not a regular file", .path.display())]
    NotAFile { path: PathBuf },
    #[error("cannot read `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ServeError {
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => ServeError::NotFound { path },
            _ => ServeError::Io { path, source },
        }
    }
}

/// Invalid configuration values.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,
    #[error("chunk_size {chunk_size} exceeds the maximum of {max} bytes")]
    ChunkSizeTooLarge { chunk_size: usize, max: usize },
    #[error("invalid default content type `{0}`")]
    ContentType(String),
    #[error(transparent)]
    Extract(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Extract(Box::new(err))
    }
}
