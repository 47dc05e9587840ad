//! Persistence seam.
//!
//! The engine never talks to a database directly. It maps its domain model
//! to and from [`CredentialVersionRecord`] and consumes the two narrow store
//! traits below; row mapping, SQL and migrations live behind them.

use crate::encryption::EncryptedValue;
use crate::error::StoreError;
use crate::types::{CredentialName, KeyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Persisted form of one credential version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialVersionRecord {
    pub uuid: Uuid,
    pub credential_name: CredentialName,
    pub version_created_at: DateTime<Utc>,
    pub type_tag: String,
    pub encrypted_value: EncryptedValue,
    pub encrypted_generation_parameters: Option<EncryptedValue>,
    pub username: Option<String>,
    pub salt: Option<String>,
    pub public_key: Option<String>,
    pub ca: Option<String>,
    pub certificate: Option<String>,
    pub ca_name: Option<String>,
    pub transitional: bool,
}

impl CredentialVersionRecord {
    /// Every encrypted field the record owns
    pub fn encrypted_values(&self) -> Vec<&EncryptedValue> {
        let mut values = vec![&self.encrypted_value];
        if let Some(parameters) = &self.encrypted_generation_parameters {
            values.push(parameters);
        }
        values
    }
}

/// Version history storage, keyed by normalized credential name
pub trait CredentialVersionStore: Send + Sync {
    /// Newest version for `name`
    fn find_latest(&self, name: &str) -> Result<Option<CredentialVersionRecord>, StoreError>;

    /// Every version for `name`, newest first
    fn find_all(&self, name: &str) -> Result<Vec<CredentialVersionRecord>, StoreError>;

    /// Append a version. Creating a credential name that already exists under
    /// another identity fails with [`StoreError::UniqueViolation`].
    fn save(&self, record: &CredentialVersionRecord) -> Result<(), StoreError>;
}

/// Row-level access to encrypted values, used by key rotation
pub trait EncryptedValueStore: Send + Sync {
    /// Number of stored values per key id
    fn count_by_key_id(&self) -> Result<HashMap<KeyId, u64>, StoreError>;

    /// At most `limit` values written under any of `key_ids`
    fn find_page_by_key_ids(
        &self,
        key_ids: &[KeyId],
        limit: usize,
    ) -> Result<Vec<EncryptedValue>, StoreError>;

    /// Replace the blob of the value with the same uuid
    fn update(&self, value: &EncryptedValue) -> Result<(), StoreError>;
}
