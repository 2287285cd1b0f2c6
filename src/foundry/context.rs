//! Execution Context
//!
//! The [`Foundry`] is the shared, per-run context: a concurrent property bag,
//! a logger reference and the run's settings. Clones are cheap and share the
//! same property bag, which is how for-each branches write into one run.
//!
//! Every operation invocation runs against a [`Foundry::scoped`] view: same
//! properties, but its own [`Foundry::scope`] id. Operations that keep
//! state between `execute` and `compensate` key it by that scope, so two
//! concurrent invocations of one operation never see each other's state.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use uuid::Uuid;

use crate::error::{ForgeError, Result};
use crate::settings::ForgeSettings;

use super::logger::ForgeLogger;
use super::value::{DataValue, FromDataValue};

/// Per-run execution context.
///
/// # Example
///
/// ```
/// use workforge::foundry::Foundry;
///
/// let foundry = Foundry::new("orders");
/// foundry.set("count", 3);
///
/// assert_eq!(foundry.get_as::<i64>("count").unwrap(), Some(3));
/// assert!(foundry.remove("count"));
/// assert!(foundry.get("count").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct Foundry {
    id: Uuid,
    scope: Uuid,
    name: String,
    properties: Arc<DashMap<String, DataValue>>,
    logger: ForgeLogger,
    settings: ForgeSettings,
}

impl Foundry {
    /// Creates a foundry with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_settings(name, ForgeSettings::default())
    }

    /// Creates a foundry with explicit settings.
    pub fn with_settings(name: impl Into<String>, settings: ForgeSettings) -> Self {
        let name = name.into();
        let id = Uuid::new_v4();
        Self {
            id,
            scope: id,
            logger: ForgeLogger::new(&name),
            name,
            properties: Arc::new(DashMap::new()),
            settings,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Identifier of the invocation this view belongs to. Equals
    /// [`Foundry::id`] for the foundry handed to the Smith.
    pub fn scope(&self) -> Uuid {
        self.scope
    }

    /// A view sharing this run's properties under a fresh scope.
    pub fn scoped(&self) -> Self {
        Self {
            scope: Uuid::new_v4(),
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn logger(&self) -> &ForgeLogger {
        &self.logger
    }

    pub fn settings(&self) -> &ForgeSettings {
        &self.settings
    }

    /// Returns a copy of the stored value, or `None` when absent.
    pub fn get(&self, key: &str) -> Option<DataValue> {
        self.properties.get(key).map(|entry| entry.value().clone())
    }

    /// Typed read: `Ok(None)` when absent, `TypeMismatch` when the stored
    /// value has another type.
    pub fn get_as<T: FromDataValue>(&self, key: &str) -> Result<Option<T>> {
        match self.properties.get(key) {
            Some(entry) => T::extract(key, entry.value()).map(Some),
            None => Ok(None),
        }
    }

    /// Typed read falling back to `default` only when the key is absent.
    pub fn get_or_default<T: FromDataValue>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get_as(key)?.unwrap_or(default))
    }

    /// Stores a value, replacing any previous one.
    pub fn set(&self, key: impl Into<String>, value: impl Into<DataValue>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Removes a key, returning true if it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.properties.remove(key).is_some()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Atomically rewrites one entry. The closure sees the current value
    /// (if any) and returns the new one.
    pub fn update<F>(&self, key: &str, f: F) -> DataValue
    where
        F: FnOnce(Option<&DataValue>) -> DataValue,
    {
        match self.properties.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let next = f(Some(occupied.get()));
                occupied.insert(next.clone());
                next
            }
            Entry::Vacant(vacant) => {
                let next = f(None);
                vacant.insert(next.clone());
                next
            }
        }
    }

    /// Appends `value` to the list stored under `key`, creating the list
    /// when absent. Returns the new length.
    pub fn push(&self, key: &str, value: impl Into<DataValue>) -> Result<usize> {
        let value = value.into();
        let mut entry = self
            .properties
            .entry(key.to_string())
            .or_insert_with(|| DataValue::List(Vec::new()));
        match entry.value_mut() {
            DataValue::List(items) => {
                items.push(value);
                Ok(items.len())
            }
            other => Err(ForgeError::TypeMismatch {
                key: key.to_string(),
                expected: "list",
                actual: other.type_name(),
            }),
        }
    }

    /// Number of stored properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Sorted list of keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.properties.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Point-in-time copy of every property, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<String, DataValue> {
        self.properties
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Replaces the whole property bag with `entries`.
    pub fn restore(&self, entries: BTreeMap<String, DataValue>) {
        self.properties.clear();
        for (key, value) in entries {
            self.properties.insert(key, value);
        }
        debug!(
            "Foundry '{}' restored with {} properties",
            self.name,
            self.properties.len()
        );
    }
}
