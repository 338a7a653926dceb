use thiserror::Error;

/// Failure modes callers branch on. Everything else travels as `anyhow::Error`.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("page looks like an anti-bot challenge: {url}")]
    Blocked { url: String },

    #[error("search returned no properties: {url}")]
    NoResults { url: String },

    #[error("not a property url: {0}")]
    InvalidPropertyUrl(String),

    #[error("giving up on {url} after {attempts} attempts (last status: {status:?})")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        status: Option<u16>,
    },

    #[error("failed to write results to {path}: {reason}")]
    OutputWrite { path: String, reason: String },
}
