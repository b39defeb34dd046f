use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use url::Url;

use super::ApiRequest;
use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        Self::build(remote, None)
    }

    /// Client that authenticates every request with a bearer token
    pub fn with_bearer_token(remote: &Url, token: &str) -> Result<Self, ApiError> {
        Self::build(remote, Some(token))
    }

    fn build(remote: &Url, token: Option<&str>) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidToken)?;
            value.set_sensitive(true);
            default_headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self {
            remote: remote.clone(),
            client,
        })
    }

    pub async fn call<T: ApiRequest>(&self, request: T) -> Result<T::Response, ApiError> {
        let request_builder = request.build_request(&self.remote, &self.client)?;
        let response = request_builder.send().await?;

        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await?;
            // no-content replies decode as `null`, which fits `()` responses
            let body: &[u8] = if body.is_empty() { b"null" } else { &body };
            Ok(serde_json::from_slice(body)?)
        } else {
            Err(ApiError::HttpStatus(status, response.text().await?))
        }
    }

    /// Like [`ApiClient::call`] but a 404 is `Ok(None)`
    pub async fn call_optional<T: ApiRequest>(
        &self,
        request: T,
    ) -> Result<Option<T::Response>, ApiError> {
        not_found_as_none(self.call(request).await)
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    /// Get the underlying HTTP client for custom requests
    pub fn http_client(&self) -> &Client {
        &self.client
    }
}

pub(crate) fn not_found_as_none<T>(result: Result<T, ApiError>) -> Result<Option<T>, ApiError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_not_found_is_none() {
        let missing: Result<u8, ApiError> =
            Err(ApiError::HttpStatus(StatusCode::NOT_FOUND, String::new()));
        assert!(matches!(not_found_as_none(missing), Ok(None)));

        let failed: Result<u8, ApiError> = Err(ApiError::HttpStatus(
            StatusCode::INTERNAL_SERVER_ERROR,
            "boom".to_string(),
        ));
        assert!(matches!(
            not_found_as_none(failed),
            Err(ApiError::HttpStatus(StatusCode::INTERNAL_SERVER_ERROR, _))
        ));

        assert!(matches!(not_found_as_none(Ok(7u8)), Ok(Some(7))));
    }

    #[test]
    fn test_bearer_token_validation() {
        let remote = Url::parse("https://api.example.com/").unwrap();
        let api = ApiClient::with_bearer_token(&remote, "token-123").unwrap();
        assert_eq!(api.base_url(), &remote);

        assert!(matches!(
            ApiClient::with_bearer_token(&remote, "bad\ntoken"),
            Err(ApiError::InvalidToken)
        ));
    }
}
