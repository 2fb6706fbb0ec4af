//! Settings table: key -> value cell for one scope
//!
//! The map sits behind an `Arc` and is copied on write, so a key listing keeps
//! the snapshot it was taken from no matter what happens to the table afterwards.

use super::value::ValueCell;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsTable {
    cells: Arc<BTreeMap<String, ValueCell>>,
}

impl SettingsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ValueCell> {
        self.cells.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cells.contains_key(key)
    }

    /// Insert or fully replace the cell for `key`; an unset cell removes the key
    pub fn set(&mut self, key: impl Into<String>, cell: ValueCell) {
        let key = key.into();
        if cell.is_set() {
            Arc::make_mut(&mut self.cells).insert(key, cell);
        } else {
            self.remove(&key);
        }
    }

    /// Returns whether a cell was removed
    pub fn remove(&mut self, key: &str) -> bool {
        if !self.cells.contains_key(key) {
            return false;
        }
        Arc::make_mut(&mut self.cells).remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn keys(&self) -> SettingsKeys {
        SettingsKeys {
            snapshot: Arc::clone(&self.cells),
            prefix: None,
        }
    }

    pub fn keys_with_prefix(&self, prefix: impl Into<String>) -> SettingsKeys {
        SettingsKeys {
            snapshot: Arc::clone(&self.cells),
            prefix: Some(prefix.into()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValueCell)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, ValueCell)> for SettingsTable {
    fn from_iter<I: IntoIterator<Item = (String, ValueCell)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (key, cell) in iter {
            table.set(key, cell);
        }
        table
    }
}

/// Key listing over a frozen snapshot of a table
///
/// Iteration is lazy and can be restarted any number of times.
#[derive(Debug, Clone)]
pub struct SettingsKeys {
    snapshot: Arc<BTreeMap<String, ValueCell>>,
    prefix: Option<String>,
}

impl SettingsKeys {
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.snapshot
            .keys()
            .map(String::as_str)
            .filter(move |key| match &self.prefix {
                Some(prefix) => key.starts_with(prefix.as_str()),
                None => true,
            })
    }
}

impl<'a> IntoIterator for &'a SettingsKeys {
    type Item = &'a str;
    type IntoIter = Box<dyn Iterator<Item = &'a str> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
