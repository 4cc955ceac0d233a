use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("sync failed for stream {stream} at location {location} during {phase}: {message}")]
    SyncUnit {
        stream: String,
        location: String,
        phase: &'static str,
        message: String,
    },
}
