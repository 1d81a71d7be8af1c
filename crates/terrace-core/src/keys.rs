//! Surrogate key assignment.
//!
//! Each entity type owns a [`KeyPartition`]: an append-only arena of minted
//! keys plus an index from natural code into it. Storage backends load the
//! partition, let it plan the batch, then persist whatever it minted.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
  Error, Result,
  entity::{EntityType, NaturalCode, SurrogateKey},
};

/// All key mappings of one entity type.
#[derive(Debug, Clone)]
pub struct KeyPartition {
  entity_type: EntityType,
  /// Mappings in key order; never shrinks.
  arena:       Vec<(SurrogateKey, NaturalCode)>,
  /// Natural code → position in `arena`.
  index:       HashMap<NaturalCode, usize>,
}

/// The keys for one batch of natural codes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyAssignment {
  /// Every requested code with its key, existing or freshly minted.
  pub resolved: BTreeMap<NaturalCode, SurrogateKey>,
  /// Codes that received a new key in this batch, in minting order.
  pub minted:   Vec<(NaturalCode, SurrogateKey)>,
}

impl KeyAssignment {
  pub fn get(&self, code: &NaturalCode) -> Option<SurrogateKey> {
    self.resolved.get(code).copied()
  }

  /// Fail if two codes in the batch resolved to the same key.
  pub fn verify_injective(&self, entity_type: EntityType) -> Result<()> {
    let mut seen: HashMap<SurrogateKey, &NaturalCode> = HashMap::new();
    for (code, key) in &self.resolved {
      if let Some(first) = seen.insert(*key, code) {
        return Err(Error::DuplicateKeyConflict {
          entity_type,
          key: *key,
          first: first.clone(),
          second: code.clone(),
        });
      }
    }
    Ok(())
  }
}

impl KeyPartition {
  pub fn empty(entity_type: EntityType) -> Self {
    Self { entity_type, arena: Vec::new(), index: HashMap::new() }
  }

  /// Rebuild a partition from persisted mappings, in any order.
  ///
  /// Fails if the mappings are not a bijection between codes and keys.
  pub fn from_mappings(
    entity_type: EntityType,
    mappings: impl IntoIterator<Item = (NaturalCode, SurrogateKey)>,
  ) -> Result<Self> {
    let mut sorted: Vec<(SurrogateKey, NaturalCode)> =
      mappings.into_iter().map(|(code, key)| (key, code)).collect();
    sorted.sort();

    let mut partition = Self::empty(entity_type);
    for (key, code) in sorted {
      if let Some((last_key, last_code)) = partition.arena.last()
        && *last_key == key
      {
        return Err(Error::DuplicateKeyConflict {
          entity_type,
          key,
          first: last_code.clone(),
          second: code,
        });
      }
      partition.push(key, code)?;
    }
    Ok(partition)
  }

  pub fn entity_type(&self) -> EntityType { self.entity_type }

  pub fn len(&self) -> usize { self.arena.len() }

  pub fn is_empty(&self) -> bool { self.arena.is_empty() }

  pub fn get(&self, code: &NaturalCode) -> Option<SurrogateKey> {
    self.index.get(code).map(|&i| self.arena[i].0)
  }

  /// The key the next new natural code will receive.
  pub fn next_key(&self) -> SurrogateKey {
    self
      .arena
      .last()
      .map(|(key, _)| key.next())
      .unwrap_or(SurrogateKey::FIRST)
  }

  /// Resolve every code in `codes`, minting keys for unseen ones in
  /// ascending natural-code order. Repeated calls with the same codes return
  /// the same keys and mint nothing.
  pub fn assign<'a>(
    &mut self,
    codes: impl IntoIterator<Item = &'a NaturalCode>,
  ) -> Result<KeyAssignment> {
    let requested: BTreeSet<&NaturalCode> = codes.into_iter().collect();
    let mut assignment = KeyAssignment::default();

    for code in requested {
      let key = match self.get(code) {
        Some(key) => key,
        None => {
          let key = self.next_key();
          self.push(key, code.clone())?;
          assignment.minted.push((code.clone(), key));
          key
        }
      };
      assignment.resolved.insert(code.clone(), key);
    }

    assignment.verify_injective(self.entity_type)?;
    Ok(assignment)
  }

  fn push(&mut self, key: SurrogateKey, code: NaturalCode) -> Result<()> {
    if self.index.contains_key(&code) {
      return Err(Error::DuplicateKeyConflict {
        entity_type: self.entity_type,
        key,
        first: code.clone(),
        second: code,
      });
    }
    self.index.insert(code.clone(), self.arena.len());
    self.arena.push((key, code));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn codes(raw: &[&str]) -> Vec<NaturalCode> {
    raw.iter().map(|s| s.parse().unwrap()).collect()
  }

  fn keys_of(a: &KeyAssignment) -> Vec<(&str, i64)> {
    a.resolved.iter().map(|(c, k)| (c.as_str(), k.0)).collect()
  }

  #[test]
  fn new_codes_are_minted_in_ascending_order() {
    let mut p = KeyPartition::empty(EntityType::Player);
    let a = p.assign(&codes(&["300", "20", "1000"])).unwrap();
    assert_eq!(keys_of(&a), [("20", 1), ("300", 2), ("1000", 3)]);
    assert_eq!(a.minted.len(), 3);
  }

  #[test]
  fn assignment_is_independent_of_input_order() {
    let mut left = KeyPartition::empty(EntityType::Player);
    let mut right = KeyPartition::empty(EntityType::Player);
    let a = left.assign(&codes(&["5", "9", "7"])).unwrap();
    let b = right.assign(&codes(&["9", "7", "5", "7"])).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn existing_codes_keep_their_keys() {
    let mut p = KeyPartition::empty(EntityType::Team);
    p.assign(&codes(&["3", "8"])).unwrap();

    let again = p.assign(&codes(&["8", "3"])).unwrap();
    assert!(again.minted.is_empty());
    assert_eq!(keys_of(&again), [("3", 1), ("8", 2)]);

    let more = p.assign(&codes(&["1", "8"])).unwrap();
    assert_eq!(more.minted, [("1".parse::<NaturalCode>().unwrap(), SurrogateKey(3))]);
    assert_eq!(p.get(&"8".parse().unwrap()), Some(SurrogateKey(2)));
    assert_eq!(p.len(), 3);
  }

  #[test]
  fn minting_continues_after_the_highest_loaded_key() {
    let p = KeyPartition::from_mappings(EntityType::Stat, [
      ("b".parse::<NaturalCode>().unwrap(), SurrogateKey(7)),
      ("a".parse::<NaturalCode>().unwrap(), SurrogateKey(2)),
    ])
    .unwrap();
    assert_eq!(p.next_key(), SurrogateKey(8));
    assert_eq!(KeyPartition::empty(EntityType::Stat).next_key(), SurrogateKey::FIRST);
  }

  #[test]
  fn loading_a_non_injective_mapping_fails() {
    let err = KeyPartition::from_mappings(EntityType::Team, [
      ("3".parse::<NaturalCode>().unwrap(), SurrogateKey(1)),
      ("8".parse::<NaturalCode>().unwrap(), SurrogateKey(1)),
    ])
    .unwrap_err();
    assert!(matches!(err, Error::DuplicateKeyConflict { key: SurrogateKey(1), .. }));

    let err = KeyPartition::from_mappings(EntityType::Team, [
      ("3".parse::<NaturalCode>().unwrap(), SurrogateKey(1)),
      ("3".parse::<NaturalCode>().unwrap(), SurrogateKey(2)),
    ])
    .unwrap_err();
    assert!(matches!(err, Error::DuplicateKeyConflict { .. }));
  }

  #[test]
  fn verify_injective_catches_shared_keys() {
    let mut a = KeyAssignment::default();
    a.resolved.insert("3".parse::<NaturalCode>().unwrap(), SurrogateKey(4));
    a.resolved.insert("8".parse::<NaturalCode>().unwrap(), SurrogateKey(4));
    assert!(a.verify_injective(EntityType::Team).is_err());
  }
}
