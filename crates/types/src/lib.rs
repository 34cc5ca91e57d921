use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default display name for a configured inverter.
pub const DEFAULT_DEVICE_NAME: &str = "SunGrow Inverter";

/// A single scalar reading as reported by the inverter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            FieldValue::Text(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(value) => write!(f, "{value}"),
            FieldValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// One measurement item from a telemetry read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverterItem {
    /// Normalized field key, e.g. `total_yield`.
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    /// `None` when the device sent the item without a usable scalar.
    pub value: Option<FieldValue>,
}

impl InverterItem {
    pub fn new(name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            name: name.into(),
            description: None,
            unit: None,
            value: Some(value.into()),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// A full telemetry read, keyed by field name. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    items: BTreeMap<String, InverterItem>,
}

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<&InverterItem> {
        self.items.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InverterItem)> {
        self.items.iter().map(|(name, item)| (name.as_str(), item))
    }

    /// Adds `item`, returning the item it replaced under the same name.
    fn insert(&mut self, item: InverterItem) -> Option<InverterItem> {
        self.items.insert(item.name.clone(), item)
    }
}

impl FromIterator<InverterItem> for Snapshot {
    /// Later items with the same name replace earlier ones.
    fn from_iter<I: IntoIterator<Item = InverterItem>>(iter: I) -> Self {
        let mut snapshot = Self::default();
        for item in iter {
            if let Some(replaced) = snapshot.insert(item) {
                debug!(
                    field = %replaced.name,
                    replaced = ?replaced.value,
                    "duplicate field in read, keeping the later item"
                );
            }
        }
        snapshot
    }
}

/// Identity of a configured inverter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub address: String,
    pub name: String,
}

impl DeviceIdentity {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name: name.unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string()),
        }
    }
}
