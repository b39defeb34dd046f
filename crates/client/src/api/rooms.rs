//! Room approval and join-status endpoints

use common::room::{JoinStatus, WrappedGroupKey};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{endpoint, ApiRequest};
use crate::error::ApiError;

pub const ROOMS_PATH: &str = "rooms";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveParticipantBody {
    pub wrapped_group_key: WrappedGroupKey,
}

/// Creator approves a participant and hands over their wrapped group key
#[derive(Debug, Clone)]
pub struct ApproveParticipantRequest {
    pub room_id: String,
    pub participant_id: String,
    pub wrapped_group_key: WrappedGroupKey,
}

impl ApiRequest for ApproveParticipantRequest {
    type Response = ();

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let url = endpoint(
            base_url,
            &[
                ROOMS_PATH,
                self.room_id.as_str(),
                "participants",
                self.participant_id.as_str(),
                "approve",
            ],
        )?;
        Ok(client.post(url).json(&ApproveParticipantBody {
            wrapped_group_key: self.wrapped_group_key,
        }))
    }
}

/// Participant polls the state of their join request
#[derive(Debug, Clone)]
pub struct JoinStatusRequest {
    pub room_id: String,
    pub participant_id: String,
}

impl ApiRequest for JoinStatusRequest {
    type Response = JoinStatus;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let url = endpoint(
            base_url,
            &[ROOMS_PATH, self.room_id.as_str(), "join-status", self.participant_id.as_str()],
        )?;
        Ok(client.get(url))
    }
}
