use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file {0:?} exists, but is a symbolic link")]
    SymlinkRejected(std::path::PathBuf),

    #[error("cache file version {found} is incompatible with the running version {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("failed to read cache file {path:?}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write cache file {path:?}: {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode cache file {path:?}: {source}")]
    Decode {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
