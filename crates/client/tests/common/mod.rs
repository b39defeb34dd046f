//! Shared test utilities for client integration tests
#![allow(dead_code)]

use client::api::ApiRequest;
use client::ApiClient;
use serde_json::Value;
use url::Url;

pub fn base_url() -> Url {
    Url::parse("https://api.example.com/v1/").unwrap()
}

/// Build a request against [`base_url`] without sending it
pub fn build<T: ApiRequest>(request: T) -> reqwest::Request {
    let api = ApiClient::new(&base_url()).unwrap();
    request
        .build_request(api.base_url(), api.http_client())
        .unwrap()
        .build()
        .unwrap()
}

pub fn json_body(request: &reqwest::Request) -> Value {
    let bytes = request
        .body()
        .and_then(|body| body.as_bytes())
        .expect("request has a buffered body");
    serde_json::from_slice(bytes).unwrap()
}
