use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read or write {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed cache metadata at {path}: {source}")]
    Malformed {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
