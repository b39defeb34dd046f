//! HTTP implementations of the remote collaborator traits

use async_trait::async_trait;
use common::backup::{BackupRecord, BackupRemote};
use common::room::{GroupKeyDistribution, JoinStatus, WrappedGroupKey};

use crate::api::key_backup::{GetKeyBackupRequest, PutKeyBackupRequest};
use crate::api::rooms::{ApproveParticipantRequest, JoinStatusRequest};
use crate::api::ApiClient;
use crate::error::ApiError;

/// Backup slots behind `/keyBackup/{id}`
#[derive(Debug, Clone)]
pub struct HttpBackupRemote {
    api: ApiClient,
}

impl HttpBackupRemote {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl BackupRemote for HttpBackupRemote {
    type Error = ApiError;

    async fn put_backup(&self, key_id: &str, record: &BackupRecord) -> Result<(), Self::Error> {
        self.api
            .call(PutKeyBackupRequest {
                key_id: key_id.to_string(),
                record: record.clone(),
            })
            .await
    }

    async fn get_backup(&self, key_id: &str) -> Result<Option<BackupRecord>, Self::Error> {
        self.api
            .call_optional(GetKeyBackupRequest {
                key_id: key_id.to_string(),
            })
            .await
    }
}

/// Group-key delivery through the room endpoints
#[derive(Debug, Clone)]
pub struct HttpDistribution {
    api: ApiClient,
}

impl HttpDistribution {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl GroupKeyDistribution for HttpDistribution {
    type Error = ApiError;

    async fn submit_wrapped_key(
        &self,
        room_id: &str,
        participant_id: &str,
        wrapped_group_key: &WrappedGroupKey,
    ) -> Result<(), Self::Error> {
        self.api
            .call(ApproveParticipantRequest {
                room_id: room_id.to_string(),
                participant_id: participant_id.to_string(),
                wrapped_group_key: wrapped_group_key.clone(),
            })
            .await
    }

    async fn join_status(
        &self,
        room_id: &str,
        participant_id: &str,
    ) -> Result<JoinStatus, Self::Error> {
        self.api
            .call(JoinStatusRequest {
                room_id: room_id.to_string(),
                participant_id: participant_id.to_string(),
            })
            .await
    }
}
