//! How a key record looks at rest
//!
//! A durable entry is either the record's plain JSON or a vault envelope
//! `{"_vault": true, "ciphertext": .., "iv": ..}`. [`StoredValue`] makes the
//! two cases explicit so readers have to handle both.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::StorageError;

const VAULT_TAG: &str = "_vault";

/// AES-GCM ciphertext of a record under the vault master key (both fields base64)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEnvelope {
    #[serde(rename = "_vault")]
    tag: bool,
    pub ciphertext: String,
    pub iv: String,
}

impl VaultEnvelope {
    pub fn new(ciphertext: String, iv: String) -> Self {
        Self {
            tag: true,
            ciphertext,
            iv,
        }
    }
}

/// A persisted value: plaintext, or wrapped under the vault
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue<T> {
    Plain(T),
    VaultWrapped(VaultEnvelope),
}

/// True when a raw stored value carries the vault tag
pub fn is_vault_wrapped(value: &Value) -> bool {
    matches!(value.get(VAULT_TAG), Some(Value::Bool(true)))
}

impl<T> StoredValue<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn from_value(value: Value) -> Result<Self, StorageError> {
        if is_vault_wrapped(&value) {
            Ok(StoredValue::VaultWrapped(serde_json::from_value(value)?))
        } else {
            Ok(StoredValue::Plain(serde_json::from_value(value)?))
        }
    }

    pub fn into_value(self) -> Result<Value, StorageError> {
        Ok(match self {
            StoredValue::Plain(inner) => serde_json::to_value(inner)?,
            StoredValue::VaultWrapped(envelope) => serde_json::to_value(envelope)?,
        })
    }

    pub fn is_vault_wrapped(&self) -> bool {
        matches!(self, StoredValue::VaultWrapped(_))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = VaultEnvelope::new("Y3Q=".to_string(), "aXY=".to_string());
        let value = StoredValue::<Record>::VaultWrapped(envelope)
            .into_value()
            .unwrap();
        assert_eq!(
            value,
            json!({"_vault": true, "ciphertext": "Y3Q=", "iv": "aXY="})
        );
    }

    #[test]
    fn test_dispatch_on_tag() {
        let plain = StoredValue::<Record>::from_value(json!({"name": "link"})).unwrap();
        assert_eq!(
            plain,
            StoredValue::Plain(Record {
                name: "link".to_string()
            })
        );

        let wrapped =
            StoredValue::<Record>::from_value(json!({"_vault": true, "ciphertext": "a", "iv": "b"}))
                .unwrap();
        assert!(wrapped.is_vault_wrapped());
    }

    #[test]
    fn test_false_tag_is_plain() {
        assert!(!is_vault_wrapped(&json!({"_vault": false})));
        assert!(!is_vault_wrapped(&json!("just a string")));
    }
}
