use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("base URL {0} cannot carry a path")]
    CannotBeABase(url::Url),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("bearer token is not a valid header value")]
    InvalidToken,
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::HttpStatus(StatusCode::NOT_FOUND, _))
    }
}
