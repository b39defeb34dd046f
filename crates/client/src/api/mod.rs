//! Typed requests against the BurnWare API

#[allow(clippy::module_inception)]
mod client;
pub mod key_backup;
pub mod rooms;

pub use client::ApiClient;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::ApiError;

pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError>;
}

/// Append percent-encoded path segments to `base`
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ApiError::CannotBeABase(base.clone()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
