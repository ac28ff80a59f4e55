use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("failed to read {path} while hashing: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}
