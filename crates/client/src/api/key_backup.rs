//! `/keyBackup/{id}`: one passphrase-wrapped private key per slot

use common::backup::BackupRecord;
use reqwest::{Client, RequestBuilder};
use url::Url;

use super::{endpoint, ApiRequest};
use crate::error::ApiError;

pub const KEY_BACKUP_PATH: &str = "keyBackup";

/// Store or overwrite the backup for a key
#[derive(Debug, Clone)]
pub struct PutKeyBackupRequest {
    pub key_id: String,
    pub record: BackupRecord,
}

impl ApiRequest for PutKeyBackupRequest {
    type Response = ();

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let url = endpoint(base_url, &[KEY_BACKUP_PATH, self.key_id.as_str()])?;
        Ok(client.put(url).json(&self.record))
    }
}

/// Fetch the backup for a key; the server answers 404 when there is none
#[derive(Debug, Clone)]
pub struct GetKeyBackupRequest {
    pub key_id: String,
}

impl ApiRequest for GetKeyBackupRequest {
    type Response = BackupRecord;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let url = endpoint(base_url, &[KEY_BACKUP_PATH, self.key_id.as_str()])?;
        Ok(client.get(url))
    }
}
