use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::WrappedGroupKey;

/// Where a participant's join request stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinState {
    Pending,
    Approved,
    Rejected,
}

/// What the join-status endpoint reports to a polling participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinStatus {
    pub status: JoinState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped_group_key: Option<WrappedGroupKey>,
}

impl JoinStatus {
    pub fn pending() -> Self {
        Self {
            status: JoinState::Pending,
            wrapped_group_key: None,
        }
    }
}

/// The server side of group-key delivery
///
/// The creator submits one wrapped key per approved participant; the
/// participant polls for their own status until it carries the wrapped key.
#[async_trait]
pub trait GroupKeyDistribution: Send + Sync + Debug + Clone + 'static {
    type Error: Display + Debug + Send + Sync + 'static;

    /// Approve `participant_id` and hand them their wrapped group key
    async fn submit_wrapped_key(
        &self,
        room_id: &str,
        participant_id: &str,
        wrapped_group_key: &WrappedGroupKey,
    ) -> Result<(), Self::Error>;

    /// Status of the caller's join request
    async fn join_status(&self, room_id: &str, participant_id: &str)
        -> Result<JoinStatus, Self::Error>;
}

/// In-memory distribution endpoint, used in tests and local demos
#[derive(Debug, Clone, Default)]
pub struct MemoryDistribution {
    inner: Arc<RwLock<HashMap<(String, String), JoinStatus>>>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryDistributionError {
    #[error("memory distribution error: {0}")]
    Internal(String),
    #[error("no join request for participant {1} in room {0}")]
    UnknownParticipant(String, String),
}

impl MemoryDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending join request
    pub fn request_join(&self, room_id: &str, participant_id: &str) -> Result<(), MemoryDistributionError> {
        let mut inner = self.inner.write().map_err(|e| {
            MemoryDistributionError::Internal(format!("failed to acquire write lock: {}", e))
        })?;
        inner.insert(
            (room_id.to_string(), participant_id.to_string()),
            JoinStatus::pending(),
        );
        Ok(())
    }

    pub fn reject(&self, room_id: &str, participant_id: &str) -> Result<(), MemoryDistributionError> {
        let mut inner = self.inner.write().map_err(|e| {
            MemoryDistributionError::Internal(format!("failed to acquire write lock: {}", e))
        })?;
        inner.insert(
            (room_id.to_string(), participant_id.to_string()),
            JoinStatus {
                status: JoinState::Rejected,
                wrapped_group_key: None,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl GroupKeyDistribution for MemoryDistribution {
    type Error = MemoryDistributionError;

    async fn submit_wrapped_key(
        &self,
        room_id: &str,
        participant_id: &str,
        wrapped_group_key: &WrappedGroupKey,
    ) -> Result<(), Self::Error> {
        let mut inner = self.inner.write().map_err(|e| {
            MemoryDistributionError::Internal(format!("failed to acquire write lock: {}", e))
        })?;
        inner.insert(
            (room_id.to_string(), participant_id.to_string()),
            JoinStatus {
                status: JoinState::Approved,
                wrapped_group_key: Some(wrapped_group_key.clone()),
            },
        );
        Ok(())
    }

    async fn join_status(
        &self,
        room_id: &str,
        participant_id: &str,
    ) -> Result<JoinStatus, Self::Error> {
        let inner = self.inner.read().map_err(|e| {
            MemoryDistributionError::Internal(format!("failed to acquire read lock: {}", e))
        })?;
        inner
            .get(&(room_id.to_string(), participant_id.to_string()))
            .cloned()
            .ok_or_else(|| {
                MemoryDistributionError::UnknownParticipant(
                    room_id.to_string(),
                    participant_id.to_string(),
                )
            })
    }
}
