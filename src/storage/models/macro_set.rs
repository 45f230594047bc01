//! Macro (sub-parameter) values carried alongside a click

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{AttributorError, Result};

pub const MACRO_SLOTS: usize = 25;

/// A validated `subN` key, N in 1..=25
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacroKey(u8);

impl MacroKey {
    pub fn new(n: u8) -> Result<Self> {
        if (1..=MACRO_SLOTS as u8).contains(&n) {
            Ok(MacroKey(n))
        } else {
            Err(AttributorError::invalid_macro_key(format!(
                "sub{} is outside sub1..sub{}",
                n, MACRO_SLOTS
            )))
        }
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize - 1
    }

    pub fn all() -> impl Iterator<Item = MacroKey> {
        (1..=MACRO_SLOTS as u8).map(MacroKey)
    }

    pub fn name(&self) -> String {
        format!("sub{}", self.0)
    }
}

impl FromStr for MacroKey {
    type Err = AttributorError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let n = lower
            .strip_prefix("sub")
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u8>().ok())
            .ok_or_else(|| {
                AttributorError::invalid_macro_key(format!("'{}' is not a macro key", s))
            })?;
        MacroKey::new(n)
    }
}

impl fmt::Display for MacroKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub{}", self.0)
    }
}

impl TryFrom<String> for MacroKey {
    type Error = AttributorError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MacroKey> for String {
    fn from(value: MacroKey) -> Self {
        value.name()
    }
}

/// Partial macro update
///
/// Blank values are dropped on construction, so applying a patch can only
/// set or overwrite slots, never clear them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroPatch(BTreeMap<MacroKey, String>);

impl MacroPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: MacroKey, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            return;
        }
        self.0.insert(key, value);
    }

    pub fn with(mut self, key: MacroKey, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Build from raw `subN -> value` pairs (request bodies, query strings)
    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self>
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut patch = Self::new();
        for (key, value) in pairs {
            patch.set(key.as_ref().parse()?, value);
        }
        Ok(patch)
    }

    pub fn get(&self, key: MacroKey) -> Option<&str> {
        self.0.get(&key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MacroKey, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.iter()
            .map(|(k, v)| (k.name(), v.to_string()))
            .collect()
    }
}

/// All macro values accumulated for one click
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroSet {
    pub click_id: String,
    pub values: [Option<String>; MACRO_SLOTS],
    /// Bumped on every stored merge; used for conditional updates
    pub version: i64,
}

impl MacroSet {
    pub fn empty(click_id: impl Into<String>) -> Self {
        Self {
            click_id: click_id.into(),
            values: Default::default(),
            version: 0,
        }
    }

    pub fn from_patch(click_id: impl Into<String>, patch: &MacroPatch) -> Self {
        let mut set = Self::empty(click_id);
        set.apply(patch);
        set
    }

    pub fn get(&self, key: MacroKey) -> Option<&str> {
        self.values[key.index()].as_deref()
    }

    /// Apply a patch in place; returns whether any slot changed
    pub fn apply(&mut self, patch: &MacroPatch) -> bool {
        let mut changed = false;
        for (key, value) in patch.iter() {
            let slot = &mut self.values[key.index()];
            if slot.as_deref() != Some(value) {
                *slot = Some(value.to_string());
                changed = true;
            }
        }
        changed
    }

    /// Non-empty slots in key order
    pub fn iter(&self) -> impl Iterator<Item = (MacroKey, &str)> {
        MacroKey::all().filter_map(move |key| self.get(key).map(|v| (key, v)))
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.iter()
            .map(|(k, v)| (k.name(), v.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> MacroKey {
        MacroKey::new(n).unwrap()
    }

    #[test]
    fn test_macro_key_parsing() {
        assert_eq!("sub1".parse::<MacroKey>().unwrap().number(), 1);
        assert_eq!("SUB25".parse::<MacroKey>().unwrap().number(), 25);
        assert_eq!(" Sub7 ".parse::<MacroKey>().unwrap().index(), 6);

        for bad in ["sub0", "sub26", "sub", "s1", "sub-1", "sub1a", "utm_source"] {
            let err = bad.parse::<MacroKey>().unwrap_err();
            assert!(matches!(err, AttributorError::InvalidMacroKey(_)), "{bad}");
        }
    }

    #[test]
    fn test_patch_drops_blank_values() {
        let patch = MacroPatch::from_pairs([("sub1", "abc"), ("sub2", ""), ("sub3", "  ")]).unwrap();
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get(key(1)), Some("abc"));
    }

    #[test]
    fn test_patch_rejects_unknown_keys() {
        assert!(MacroPatch::from_pairs([("sub30", "x")]).is_err());
    }

    #[test]
    fn test_apply_overwrites_and_never_erases() {
        let mut set = MacroSet::from_patch("c1", &MacroPatch::new().with(key(1), "a").with(key(2), "b"));

        let changed = set.apply(&MacroPatch::new().with(key(1), "z").with(key(2), ""));
        assert!(changed);
        assert_eq!(set.get(key(1)), Some("z"));
        assert_eq!(set.get(key(2)), Some("b"));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let patch = MacroPatch::new().with(key(4), "x").with(key(9), "y");
        let mut once = MacroSet::empty("c1");
        once.apply(&patch);
        let mut twice = once.clone();
        assert!(!twice.apply(&patch));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_to_map_lists_only_present_slots() {
        let set = MacroSet::from_patch("c1", &MacroPatch::new().with(key(3), "v3").with(key(12), "v12"));
        let map = set.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["sub3"], "v3");
        assert_eq!(map["sub12"], "v12");
    }
}
