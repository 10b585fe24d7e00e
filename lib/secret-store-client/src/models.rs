use crate::error::{Result, SecretStoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Lease attached to a secret by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub id: String,
    pub duration_seconds: u64,
    pub renewable: bool,
}

/// A KV v2 secret as returned by `get_secret`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub data: HashMap<String, Value>,
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub lease: Option<Lease>,
}

impl Secret {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Version number reported in the secret's metadata, if any.
    pub fn version(&self) -> Option<u64> {
        self.metadata.get("version").and_then(Value::as_u64)
    }

    /// Builds a secret from a KV v2 read response.
    pub(crate) fn from_kv_response(response: Value) -> Result<Self> {
        #[derive(Deserialize)]
        struct KvResponse {
            data: Option<KvResponseData>,
            lease_id: Option<String>,
            lease_duration: Option<u64>,
            renewable: Option<bool>,
        }

        #[derive(Deserialize)]
        struct KvResponseData {
            data: Option<HashMap<String, Value>>,
            metadata: Option<HashMap<String, Value>>,
        }

        let resp: KvResponse = serde_json::from_value(response)
            .map_err(|e| SecretStoreError::InvalidResponse(format!("Invalid secret response: {}", e)))?;
        let body = resp
            .data
            .ok_or_else(|| SecretStoreError::InvalidResponse("Secret response has no data".to_string()))?;

        let lease = resp.lease_id.filter(|id| !id.is_empty()).map(|id| Lease {
            id,
            duration_seconds: resp.lease_duration.unwrap_or_default(),
            renewable: resp.renewable.unwrap_or_default(),
        });

        Ok(Self {
            data: body.data.unwrap_or_default(),
            metadata: body.metadata.unwrap_or_default(),
            lease,
        })
    }
}

/// Keys under a path, as returned by `list_secrets`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretList {
    pub keys: Vec<String>,
}

impl SecretList {
    pub(crate) fn from_list_response(response: Value) -> Result<Self> {
        #[derive(Deserialize)]
        struct ListResponse {
            data: Option<SecretList>,
        }

        let resp: ListResponse = serde_json::from_value(response)
            .map_err(|e| SecretStoreError::InvalidResponse(format!("Invalid list response: {}", e)))?;
        Ok(resp.data.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_secret_from_kv_response() {
        let response = json!({
            "request_id": "r-1",
            "lease_id": "",
            "renewable": false,
            "lease_duration": 0,
            "data": {
                "data": {"username": "admin", "password": "secret"},
                "metadata": {"version": 3, "destroyed": false}
            }
        });

        let secret = Secret::from_kv_response(response).unwrap();
        assert_eq!(secret.get("username"), Some(&json!("admin")));
        assert_eq!(secret.version(), Some(3));
        assert!(secret.lease.is_none());
    }

    #[test]
    fn test_secret_with_lease() {
        let response = json!({
            "lease_id": "secret/app/db/abc",
            "lease_duration": 600,
            "renewable": true,
            "data": {"data": {"k": "v"}, "metadata": {}}
        });

        let secret = Secret::from_kv_response(response).unwrap();
        assert_eq!(
            secret.lease,
            Some(Lease {
                id: "secret/app/db/abc".to_string(),
                duration_seconds: 600,
                renewable: true,
            })
        );
    }

    #[test]
    fn test_deleted_version_has_empty_data() {
        let response = json!({"data": {"data": null, "metadata": {"version": 2}}});
        let secret = Secret::from_kv_response(response).unwrap();
        assert!(secret.data.is_empty());
    }

    #[test]
    fn test_missing_data_rejected() {
        let result = Secret::from_kv_response(json!({"errors": []}));
        assert!(matches!(result, Err(SecretStoreError::InvalidResponse(_))));
    }

    #[test]
    fn test_list_response() {
        let list = SecretList::from_list_response(json!({"data": {"keys": ["db", "web/"]}})).unwrap();
        assert_eq!(list.keys, vec!["db".to_string(), "web/".to_string()]);
    }
}
