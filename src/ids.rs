use std::collections::{HashMap, HashSet};

use clap::ValueEnum;
use log::warn;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::error::InkfolioError;

/// Largest counter value that still fits in eight digits.
pub const NUMERIC8_MAX: u64 = 99_999_999;

/// How new artwork ids are generated.
#[derive(AsRefStr, EnumString, Debug, Display, PartialEq, Eq, Copy, Clone, ValueEnum, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    /// Time-ordered 128-bit id (version 7)
    #[value(name = "uuidv7")]
    UuidV7,
    /// Random 128-bit id (version 4)
    #[value(name = "uuidv4")]
    UuidV4,
    /// Zero-padded 8-digit counter
    #[value(name = "numeric8")]
    Numeric8,
}

/// Produces one new id per call for the chosen scheme.
pub enum IdGenerator {
    UuidV7,
    UuidV4,
    /// `None` once the counter has issued `u64::MAX`.
    Numeric8 { next: Option<u64> },
}

impl IdGenerator {
    pub fn new(scheme: IdScheme, start: u64) -> Self {
        match scheme {
            IdScheme::UuidV7 => IdGenerator::UuidV7,
            IdScheme::UuidV4 => IdGenerator::UuidV4,
            IdScheme::Numeric8 => {
                if start > NUMERIC8_MAX {
                    warn!("numeric8 start {} is wider than 8 digits", start);
                }
                IdGenerator::Numeric8 { next: Some(start) }
            }
        }
    }

    pub fn next_id(&mut self) -> Result<String, InkfolioError> {
        match self {
            // 48-bit unix ms, version 7, 12 random bits, variant 10, 62 random bits
            IdGenerator::UuidV7 => Ok(Uuid::now_v7().hyphenated().to_string()),
            IdGenerator::UuidV4 => Ok(Uuid::new_v4().hyphenated().to_string()),
            IdGenerator::Numeric8 { next } => {
                let value = next.ok_or_else(|| {
                    InkfolioError::Error("numeric8 counter exhausted".to_string())
                })?;
                if value == NUMERIC8_MAX + 1 {
                    warn!("numeric8 counter passed {}; ids are now wider than 8 digits", NUMERIC8_MAX);
                }
                *next = value.checked_add(1);
                Ok(format!("{:08}", value))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IdMapEntry {
    pub old_id: String,
    pub new_id: String,
}

/// Old id to new id, one entry per distinct old id, in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct IdMap {
    entries: Vec<IdMapEntry>,
    lookup: HashMap<String, usize>,
    issued: HashSet<String>,
}

impl IdMap {
    /// Assigns a fresh id to every distinct, non-empty old id in iteration order.
    /// Duplicates share the id of their first occurrence. A repeated generated id
    /// is an error so the map is always a bijection.
    pub fn generate<'a, I>(old_ids: I, scheme: IdScheme, start: u64) -> Result<Self, InkfolioError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut generator = IdGenerator::new(scheme, start);
        let mut map = IdMap::default();

        for old_id in old_ids {
            if old_id.is_empty() || map.lookup.contains_key(old_id) {
                continue;
            }
            map.insert(old_id.to_string(), generator.next_id()?)?;
        }

        Ok(map)
    }

    /// Builds a map from explicit pairs (used by sequential renumbering).
    pub fn from_pairs<I>(pairs: I) -> Result<Self, InkfolioError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut map = IdMap::default();
        for (old_id, new_id) in pairs {
            if map.lookup.contains_key(&old_id) {
                return Err(InkfolioError::Error(format!("Duplicate artwork id '{}'", old_id)));
            }
            map.insert(old_id, new_id)?;
        }
        Ok(map)
    }

    fn insert(&mut self, old_id: String, new_id: String) -> Result<(), InkfolioError> {
        if !self.issued.insert(new_id.clone()) {
            return Err(InkfolioError::IdCollision { id: new_id });
        }
        self.lookup.insert(old_id.clone(), self.entries.len());
        self.entries.push(IdMapEntry { old_id, new_id });
        Ok(())
    }

    pub fn get(&self, old_id: &str) -> Option<&str> {
        self.lookup
            .get(old_id)
            .map(|&i| self.entries[i].new_id.as_str())
    }

    pub fn entries(&self) -> &[IdMapEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries whose id actually changes.
    pub fn changed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.old_id != e.new_id).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// True when no two old ids share a new id.
    fn is_injective(map: &IdMap) -> bool {
        let distinct: HashSet<&str> = map.entries().iter().map(|e| e.new_id.as_str()).collect();
        distinct.len() == map.len()
    }

    fn is_v7(id: &str) -> bool {
        let uuid = Uuid::parse_str(id).unwrap();
        uuid.get_version_num() == 7 && uuid.get_variant() == uuid::Variant::RFC4122
    }

    #[test]
    fn test_numeric8_counter() {
        let map = IdMap::generate(["2020_001", "2020_002", "2020_003"], IdScheme::Numeric8, 5).unwrap();
        let new_ids: Vec<&str> = map.entries().iter().map(|e| e.new_id.as_str()).collect();
        assert_eq!(new_ids, vec!["00000005", "00000006", "00000007"]);
        assert_eq!(map.get("2020_002"), Some("00000006"));
    }

    #[test]
    fn test_duplicates_and_empty_ids_are_skipped() {
        let map = IdMap::generate(["a", "", "b", "a"], IdScheme::Numeric8, 1).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a"), Some("00000001"));
        assert_eq!(map.get("b"), Some("00000002"));
        assert!(map.get("").is_none());
    }

    #[test]
    fn test_numeric8_counter_limits() {
        let map = IdMap::generate(["a", "b"], IdScheme::Numeric8, NUMERIC8_MAX).unwrap();
        assert_eq!(map.get("a"), Some("99999999"));
        assert_eq!(map.get("b"), Some("100000000"));

        let map = IdMap::generate(["a"], IdScheme::Numeric8, u64::MAX).unwrap();
        assert_eq!(map.get("a"), Some("18446744073709551615"));

        let err = IdMap::generate(["a", "b"], IdScheme::Numeric8, u64::MAX).unwrap_err();
        assert!(matches!(err, InkfolioError::Error(_)));
    }

    #[test]
    fn test_uuid_formats() {
        let mut v7 = IdGenerator::new(IdScheme::UuidV7, 1);
        let id = v7.next_id().unwrap();
        assert_eq!(id.len(), 36);
        assert_eq!(id, id.to_lowercase());
        assert_eq!(id.split('-').map(str::len).collect::<Vec<_>>(), vec![8, 4, 4, 4, 12]);
        assert!(is_v7(&id));

        let mut v4 = IdGenerator::new(IdScheme::UuidV4, 1);
        let id = v4.next_id().unwrap();
        assert_eq!(Uuid::parse_str(&id).unwrap().get_version_num(), 4);
    }

    #[test]
    fn test_from_pairs_rejects_collisions() {
        let err = IdMap::from_pairs(vec![
            ("a".to_string(), "x".to_string()),
            ("b".to_string(), "x".to_string()),
        ])
        .unwrap_err();
        assert!(matches!(err, InkfolioError::IdCollision { .. }));

        let err = IdMap::from_pairs(vec![
            ("a".to_string(), "x".to_string()),
            ("a".to_string(), "y".to_string()),
        ])
        .unwrap_err();
        assert!(matches!(err, InkfolioError::Error(_)));
    }

    #[test]
    fn test_scheme_names() {
        assert_eq!(IdScheme::UuidV7.to_string(), "uuidv7");
        assert_eq!("numeric8".parse::<IdScheme>().unwrap(), IdScheme::Numeric8);
        assert_eq!(<IdScheme as ValueEnum>::from_str("uuidv4", true).unwrap(), IdScheme::UuidV4);
    }

    proptest! {
        #[test]
        fn prop_numeric8_is_consecutive_over_distinct_ids(
            ids in proptest::collection::vec("[a-z0-9_]{1,6}", 0..40),
            start in 0u64..1_000_000,
        ) {
            let map = IdMap::generate(ids.iter().map(String::as_str), IdScheme::Numeric8, start).unwrap();

            let mut distinct: Vec<&str> = Vec::new();
            for id in &ids {
                if !distinct.contains(&id.as_str()) {
                    distinct.push(id);
                }
            }

            prop_assert_eq!(map.len(), distinct.len());
            for (offset, old_id) in distinct.iter().enumerate() {
                let expected = format!("{:08}", start + offset as u64);
                prop_assert_eq!(map.get(old_id), Some(expected.as_str()));
            }
            prop_assert!(is_injective(&map));
        }

        #[test]
        fn prop_random_schemes_are_injective(
            ids in proptest::collection::hash_set("[a-z0-9_]{1,8}", 0..30),
            v7 in any::<bool>(),
        ) {
            let scheme = if v7 { IdScheme::UuidV7 } else { IdScheme::UuidV4 };
            let map = IdMap::generate(ids.iter().map(String::as_str), scheme, 1).unwrap();
            prop_assert_eq!(map.len(), ids.len());
            prop_assert!(is_injective(&map));
        }
    }
}
