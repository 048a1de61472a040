//! Validator registry.
//!
//! Validators are the Cores allowed to report Bitcoin fee/height status and
//! to broadcast anchor confirmations. The set is ordered as configured; the
//! election layer sorts by address itself.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

use crate::election::ElectionKey;
use crate::node::CoreId;

/// A validator entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Validator {
    /// The Core running this validator.
    pub id: CoreId,
    /// Validator address (election ordering key).
    pub address: String,
}

impl Validator {
    /// Create a validator entry.
    pub fn new(id: impl Into<CoreId>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }
}

impl ElectionKey for Validator {
    fn election_key(&self) -> &str {
        &self.address
    }

    fn core_id(&self) -> &CoreId {
        &self.id
    }
}

/// The active validator set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidatorSet {
    /// Ordered list of validators.
    validators: Vec<Validator>,
    /// Core ids for O(1) lookup (rebuilt on deserialize).
    #[serde(skip)]
    lookup: HashSet<CoreId>,
}

// Custom Deserialize to rebuild lookup HashSet
impl<'de> Deserialize<'de> for ValidatorSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ValidatorSetData {
            validators: Vec<Validator>,
        }

        let data = ValidatorSetData::deserialize(deserializer)?;
        Ok(ValidatorSet::new(data.validators))
    }
}

impl ValidatorSet {
    /// Create a new validator set. Later duplicates of a Core id are dropped.
    pub fn new(validators: Vec<Validator>) -> Self {
        let mut set = Self::empty();
        for v in validators {
            set.add(v);
        }
        set
    }

    /// Create an empty validator set.
    pub fn empty() -> Self {
        Self {
            validators: Vec::new(),
            lookup: HashSet::new(),
        }
    }

    /// Get the number of validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Check if a Core is an active validator.
    pub fn contains(&self, id: &CoreId) -> bool {
        self.lookup.contains(id)
    }

    /// Get validator at index.
    pub fn get(&self, index: usize) -> Option<&Validator> {
        self.validators.get(index)
    }

    /// Get all validators.
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Iterator over validators.
    pub fn iter(&self) -> impl Iterator<Item = &Validator> {
        self.validators.iter()
    }

    /// Add a validator to the set.
    ///
    /// Returns true if the validator was added, false if already present.
    pub fn add(&mut self, validator: Validator) -> bool {
        if self.lookup.contains(&validator.id) {
            return false;
        }
        self.lookup.insert(validator.id.clone());
        self.validators.push(validator);
        true
    }

    /// Remove a validator from the set.
    ///
    /// Returns true if the validator was removed, false if not present.
    pub fn remove(&mut self, id: &CoreId) -> bool {
        if !self.lookup.remove(id) {
            return false;
        }
        self.validators.retain(|v| &v.id != id);
        true
    }
}

impl PartialEq for ValidatorSet {
    fn eq(&self, other: &Self) -> bool {
        self.validators == other.validators
    }
}

impl Eq for ValidatorSet {}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(n: usize) -> ValidatorSet {
        ValidatorSet::new(
            (0..n)
                .map(|i| Validator::new(format!("core-{}", i).as_str(), format!("addr-{}", i)))
                .collect(),
        )
    }

    #[test]
    fn test_validator_set_new() {
        let set = set_of(2);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&"core-0".into()));
        assert!(set.contains(&"core-1".into()));
        assert!(!set.contains(&"core-2".into()));
    }

    #[test]
    fn test_validator_set_empty() {
        let set = ValidatorSet::empty();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_duplicate_ids_dropped() {
        let set = ValidatorSet::new(vec![
            Validator::new("core-0", "addr-a"),
            Validator::new("core-0", "addr-b"),
        ]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(0).unwrap().address, "addr-a");
    }

    #[test]
    fn test_add_remove_validator() {
        let mut set = set_of(1);
        assert!(set.add(Validator::new("core-9", "addr-9")));
        assert!(!set.add(Validator::new("core-9", "addr-9")));
        assert_eq!(set.len(), 2);

        assert!(set.remove(&"core-9".into()));
        assert!(!set.remove(&"core-9".into()));
        assert!(!set.contains(&"core-9".into()));
    }

    #[test]
    fn test_serde_rebuilds_lookup() {
        let set = set_of(3);
        let json = serde_json::to_string(&set).unwrap();
        let restored: ValidatorSet = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, set);
        assert!(restored.contains(&"core-2".into()));

        let bytes = bincode::serialize(&set).unwrap();
        let restored: ValidatorSet = bincode::deserialize(&bytes).unwrap();
        assert!(restored.contains(&"core-1".into()));
    }
}
