//! Encryption key lifecycle.
//!
//! Every stored blob remembers the key it was written under. [`KeySet`]
//! classifies those keys against the current configuration and
//! [`KeyRotator`] moves values written under inactive keys onto the active
//! one, batch by batch.

use crate::encryption::{EncryptedValue, Encryptor};
use crate::error::{EncryptionError, ProviderError, Result, VaultError};
use crate::store::EncryptedValueStore;
use crate::types::KeyId;
use credvault_common::logging::Logger;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClassification {
    Active,
    KnownInactive,
    Unknown,
}

/// Counts of stored values by key classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyUsageReport {
    pub active: u64,
    pub inactive: u64,
    pub unknown: u64,
}

impl KeyUsageReport {
    pub fn total(&self) -> u64 {
        self.active + self.inactive + self.unknown
    }

    fn add(&mut self, classification: KeyClassification, count: u64) {
        match classification {
            KeyClassification::Active => self.active += count,
            KeyClassification::KnownInactive => self.inactive += count,
            KeyClassification::Unknown => self.unknown += count,
        }
    }
}

/// The configured keys: exactly one active, any number of inactive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    active: KeyId,
    inactive: BTreeSet<KeyId>,
}

impl KeySet {
    pub fn new(active: KeyId, inactive: impl IntoIterator<Item = KeyId>) -> Self {
        let mut inactive: BTreeSet<KeyId> = inactive.into_iter().collect();
        inactive.remove(&active);
        Self { active, inactive }
    }

    pub fn active(&self) -> &KeyId {
        &self.active
    }

    pub fn inactive(&self) -> &BTreeSet<KeyId> {
        &self.inactive
    }

    pub fn classify(&self, key_id: &KeyId) -> KeyClassification {
        if *key_id == self.active {
            KeyClassification::Active
        } else if self.inactive.contains(key_id) {
            KeyClassification::KnownInactive
        } else {
            KeyClassification::Unknown
        }
    }

    pub fn usage_report<'a>(&self, key_ids: impl IntoIterator<Item = &'a KeyId>) -> KeyUsageReport {
        let mut report = KeyUsageReport::default();
        for key_id in key_ids {
            report.add(self.classify(key_id), 1);
        }
        report
    }
}

/// Outcome of a full rotation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RotationSummary {
    pub batches: usize,
    pub reencrypted: usize,
    pub failed: usize,
}

/// Re-encrypts values written under known inactive keys
pub struct KeyRotator {
    encryptor: Arc<Encryptor>,
    key_set: KeySet,
    store: Arc<dyn EncryptedValueStore>,
    logger: Arc<Logger>,
}

impl KeyRotator {
    pub fn new(
        encryptor: Arc<Encryptor>,
        key_set: KeySet,
        store: Arc<dyn EncryptedValueStore>,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            encryptor,
            key_set,
            store,
            logger,
        }
    }

    pub fn key_set(&self) -> &KeySet {
        &self.key_set
    }

    /// Active/inactive/unknown counts across the whole store
    pub fn stored_usage_report(&self) -> Result<KeyUsageReport> {
        let mut report = KeyUsageReport::default();
        for (key_id, count) in self.store.count_by_key_id()? {
            report.add(self.key_set.classify(&key_id), count);
        }
        Ok(report)
    }

    /// Up to `batch_size` values still written under an inactive key
    pub fn find_batch_needing_reencryption(&self, batch_size: usize) -> Result<Vec<EncryptedValue>> {
        let inactive: Vec<KeyId> = self.key_set.inactive().iter().cloned().collect();
        if inactive.is_empty() || batch_size == 0 {
            return Ok(Vec::new());
        }
        Ok(self.store.find_page_by_key_ids(&inactive, batch_size)?)
    }

    /// Like [`Self::find_batch_needing_reencryption`], minus values that
    /// already failed in this run
    fn next_batch(&self, batch_size: usize, failed: &HashSet<Uuid>) -> Result<Vec<EncryptedValue>> {
        let mut batch = self.find_batch_needing_reencryption(batch_size + failed.len())?;
        batch.retain(|value| !failed.contains(&value.uuid));
        batch.truncate(batch_size);
        Ok(batch)
    }

    /// Re-encrypt one value under the active key and persist it, keeping its
    /// uuid. Values under an unknown key are refused without touching the
    /// provider.
    pub fn reencrypt(&self, value: &EncryptedValue) -> Result<EncryptedValue> {
        if let Some(key_id) = value.key_id() {
            match self.key_set.classify(key_id) {
                KeyClassification::Active => return Ok(value.clone()),
                KeyClassification::Unknown => {
                    return Err(VaultError::Encryption(EncryptionError::new(
                        ProviderError::UnknownKey(key_id.clone()),
                    )))
                }
                KeyClassification::KnownInactive => {}
            }
        }

        let cleartext = self.encryptor.decrypt(&value.blob)?;
        let rotated = EncryptedValue {
            uuid: value.uuid,
            blob: self.encryptor.encrypt(cleartext.as_deref())?,
        };
        self.store.update(&rotated)?;
        Ok(rotated)
    }

    /// Rotate until no inactive-keyed values remain. Each value commits on
    /// its own. A value that fails is skipped for the rest of the run, so the
    /// run ends once every remaining inactive-keyed value has failed once.
    pub fn rotate_all(&self, batch_size: usize) -> Result<RotationSummary> {
        if batch_size == 0 {
            return Err(VaultError::ConfigError(
                "rotation batch size must be positive".to_string(),
            ));
        }

        let mut summary = RotationSummary::default();
        let mut failed = HashSet::new();
        loop {
            let batch = self.next_batch(batch_size, &failed)?;
            if batch.is_empty() {
                break;
            }
            summary.batches += 1;

            let mut progressed = 0;
            for value in &batch {
                match self.reencrypt(value) {
                    Ok(_) => progressed += 1,
                    Err(e) => {
                        failed.insert(value.uuid);
                        self.logger.warn_args(format_args!(
                            "Failed to re-encrypt value {}: {e}",
                            value.uuid
                        ));
                    }
                }
            }
            summary.reencrypted += progressed;

            self.logger.debug_args(format_args!(
                "Rotation batch {} re-encrypted {progressed} of {} values",
                summary.batches,
                batch.len()
            ));
        }
        summary.failed = failed.len();

        self.logger.info_args(format_args!(
            "Key rotation finished: {} values re-encrypted under {} in {} batches, {} failures",
            summary.reencrypted,
            self.key_set.active(),
            summary.batches,
            summary.failed
        ));
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_set() -> KeySet {
        KeySet::new(
            KeyId::new("active"),
            [KeyId::new("old-1"), KeyId::new("old-2"), KeyId::new("active")],
        )
    }

    #[test]
    fn test_active_key_is_never_inactive() {
        let keys = key_set();
        assert_eq!(keys.inactive().len(), 2);
        assert_eq!(keys.classify(&KeyId::new("active")), KeyClassification::Active);
        assert_eq!(
            keys.classify(&KeyId::new("old-2")),
            KeyClassification::KnownInactive
        );
        assert_eq!(
            keys.classify(&KeyId::new("stranger")),
            KeyClassification::Unknown
        );
    }

    #[test]
    fn test_usage_report_partitions_input() {
        let keys = key_set();
        let ids = [
            KeyId::new("active"),
            KeyId::new("active"),
            KeyId::new("old-1"),
            KeyId::new("stranger"),
            KeyId::new("old-2"),
        ];
        let report = keys.usage_report(ids.iter());
        assert_eq!(
            report,
            KeyUsageReport {
                active: 2,
                inactive: 2,
                unknown: 1
            }
        );
        assert_eq!(report.total(), ids.len() as u64);
    }
}
