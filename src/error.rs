use thiserror::Error;

/// Failures talking to the forum. Network-level problems are kept apart from
/// malformed payloads so callers can decide whether to retry or skip.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient failure fetching {url} after {attempts} attempt(s): {reason}")]
    Transient {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("HTTP {status} fetching {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("malformed JSON from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Server-side failures and exhausted retries may succeed on a later sweep;
    /// client errors and bad payloads will not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transient { .. } => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Parse { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Stable failure class reported in API envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Connection(_) => "store",
            AppError::Fetch(FetchError::Parse { .. }) | AppError::Json(_) => "parse",
            AppError::Fetch(_) => "fetch",
            AppError::Io(_) => "io",
            AppError::Config(_) | AppError::TomlDe(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_separate_network_from_parse_failures() {
        let transient = AppError::from(FetchError::Transient {
            url: "https://forum/t/1.json".into(),
            attempts: 5,
            reason: "HTTP 429".into(),
        });
        assert_eq!(transient.kind(), "fetch");

        let bad_json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let parse = AppError::from(FetchError::Parse {
            url: "https://forum/t/1.json".into(),
            source: bad_json,
        });
        assert_eq!(parse.kind(), "parse");
        assert_eq!(AppError::Config("bad".into()).kind(), "config");
    }
}
