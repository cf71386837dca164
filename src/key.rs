//! Row keys
//!
//! Perturbed rows are identified by their original row key extended with the
//! feature index, the iteration and whether the feature of interest is intact:
//! `<original>_<feature>_<iteration>_<f|t>`. The key generator writes these keys
//! during the loop start and the key checker verifies them during the loop end.
//!
//! Keys are decoded from the right, so original keys that contain the
//! delimiter themselves are recovered unchanged.
use crate::constants::{FOI_INTACT, FOI_REPLACED, KEY_DELIMITER};
use crate::data::RowKey;
use crate::errors::ShapleyError;
use std::fmt::{self, Display};

/// Position of a perturbed row within the batch of one original row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SvId {
    pub feature_idx: usize,
    pub iteration: usize,
    pub foi_intact: bool,
}

impl SvId {
    pub fn new(feature_idx: usize, iteration: usize, foi_intact: bool) -> Self {
        SvId {
            feature_idx,
            iteration,
            foi_intact,
        }
    }

    /// Whether this id designates the first row of a batch.
    pub fn is_batch_start(&self) -> bool {
        self.feature_idx == 0 && self.iteration == 0
    }
}

impl Display for SvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "feature {}, iteration {}, {}",
            self.feature_idx,
            self.iteration,
            if self.foi_intact { "intact" } else { "replaced" }
        )
    }
}

/// Append the components of `id` to `original`.
pub fn encode_key(original: &str, id: &SvId) -> String {
    let tag = if id.foi_intact { FOI_INTACT } else { FOI_REPLACED };
    format!(
        "{original}{d}{}{d}{}{d}{tag}",
        id.feature_idx,
        id.iteration,
        d = KEY_DELIMITER
    )
}

/// Split a generated key into the original key and the row id.
pub fn decode_key(key: &str) -> Result<(&str, SvId), ShapleyError> {
    let malformed = || ShapleyError::MalformedRowKey(key.to_string());
    let mut parts = key.rsplitn(4, KEY_DELIMITER);
    let tag = parts.next().ok_or_else(malformed)?;
    let iteration = parts.next().ok_or_else(malformed)?;
    let feature_idx = parts.next().ok_or_else(malformed)?;
    let original = parts.next().ok_or_else(malformed)?;

    let foi_intact = match tag {
        FOI_INTACT => true,
        FOI_REPLACED => false,
        _ => return Err(malformed()),
    };
    let feature_idx = parse_index(feature_idx).ok_or_else(malformed)?;
    let iteration = parse_index(iteration).ok_or_else(malformed)?;
    Ok((original, SvId::new(feature_idx, iteration, foi_intact)))
}

// Only plain decimal digits, `usize::from_str` would also accept a leading '+'.
fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Creates key generators and checkers for an opaque key type `K`.
pub struct KeyGeneratorFactory<K> {
    string_to_key: fn(String) -> K,
    key_to_string: fn(&K) -> String,
}

impl<K> Clone for KeyGeneratorFactory<K> {
    fn clone(&self) -> Self {
        KeyGeneratorFactory {
            string_to_key: self.string_to_key,
            key_to_string: self.key_to_string,
        }
    }
}

impl<K> KeyGeneratorFactory<K> {
    pub fn new(string_to_key: fn(String) -> K, key_to_string: fn(&K) -> String) -> Self {
        KeyGeneratorFactory {
            string_to_key,
            key_to_string,
        }
    }

    pub fn create_generator(&self, original_key: &K) -> RowKeyGenerator<K> {
        RowKeyGenerator {
            original_key: (self.key_to_string)(original_key),
            string_to_key: self.string_to_key,
        }
    }

    /// Create a checker for the batch that starts with `first_key_in_batch`.
    ///
    /// Fails if the key was not generated by a [`RowKeyGenerator`] or does
    /// not belong to the first feature and iteration of a batch.
    pub fn create_checker(&self, first_key_in_batch: &K) -> Result<RowKeyChecker<K>, ShapleyError> {
        let key = (self.key_to_string)(first_key_in_batch);
        let (original, id) = decode_key(&key)?;
        if !id.is_batch_start() {
            return Err(ShapleyError::NotBatchStart(key));
        }
        Ok(RowKeyChecker {
            original_key: original.to_string(),
            key_to_string: self.key_to_string,
        })
    }
}

impl KeyGeneratorFactory<RowKey> {
    pub fn for_row_keys() -> Self {
        KeyGeneratorFactory::new(RowKey::from, |k| k.as_str().to_string())
    }
}

impl KeyGeneratorFactory<String> {
    pub fn for_strings() -> Self {
        KeyGeneratorFactory::new(|s| s, |k| k.clone())
    }
}

/// Generates the keys of all perturbed rows of one original row.
pub struct RowKeyGenerator<K> {
    original_key: String,
    string_to_key: fn(String) -> K,
}

impl<K> RowKeyGenerator<K> {
    pub fn create(&self, id: &SvId) -> K {
        (self.string_to_key)(encode_key(&self.original_key, id))
    }
}

/// Verifies that the rows of one batch arrive in the expected order.
pub struct RowKeyChecker<K> {
    original_key: String,
    key_to_string: fn(&K) -> String,
}

impl<K> RowKeyChecker<K> {
    pub fn original_key(&self) -> &str {
        &self.original_key
    }

    /// Check that `key` belongs to this batch and designates `expected`.
    pub fn check(&self, key: &K, expected: &SvId) -> Result<(), ShapleyError> {
        let key = (self.key_to_string)(key);
        let (original, id) = decode_key(&key)?;
        if original != self.original_key {
            return Err(ShapleyError::ForeignRowKey {
                key,
                original: self.original_key.clone(),
            });
        }
        if id != *expected {
            return Err(ShapleyError::UnexpectedOrder {
                original: self.original_key.clone(),
                expected: expected.to_string(),
                found: id.to_string(),
            });
        }
        Ok(())
    }

    /// Whether `key` was generated for the same original row as this batch.
    pub fn belongs_to_batch(&self, key: &K) -> Result<bool, ShapleyError> {
        let key = (self.key_to_string)(key);
        let (original, _) = decode_key(&key)?;
        Ok(original == self.original_key)
    }
}
