use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use types::{FieldValue, Snapshot};

use crate::Field;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("field {0} is present but carries no scalar value")]
    MissingValue(Field),
}

/// Latest published values, keyed by field. Serializes as `{"commonua": 230.1, ...}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PublishedData {
    values: BTreeMap<Field, FieldValue>,
}

impl PublishedData {
    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.values.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &FieldValue)> {
        self.values.iter().map(|(field, value)| (*field, value))
    }
}

impl FromIterator<(Field, FieldValue)> for PublishedData {
    fn from_iter<I: IntoIterator<Item = (Field, FieldValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Selects the allow-listed fields present in `snapshot`.
///
/// Fields missing from the snapshot are skipped; a present field without a
/// scalar value fails the whole projection so a cycle never publishes a mix.
pub fn project(snapshot: &Snapshot, allow_list: &[Field]) -> Result<PublishedData, ProjectionError> {
    let mut values = BTreeMap::new();
    for &field in allow_list {
        let Some(item) = snapshot.get(field.as_str()) else {
            continue;
        };
        let value = item
            .value
            .clone()
            .ok_or(ProjectionError::MissingValue(field))?;
        values.insert(field, value);
    }
    trace!(
        available = snapshot.len(),
        published = values.len(),
        "snapshot projected"
    );
    Ok(PublishedData { values })
}
