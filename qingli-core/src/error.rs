use thiserror::Error;

/// 队列 API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("hostname is required")]
    MissingHost,
    #[error("invalid API key: expected 32 alphanumeric characters")]
    InvalidApiKey,
    #[error("unauthorized: invalid API key")]
    Unauthorized,
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
