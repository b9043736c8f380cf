//! Generic named-field entities and the typed records mapped onto them.
//!
//! Stores persist rows as an [`Entity`]: a partition key, a row key and a bag
//! of typed properties. Typed records opt in by implementing [`TableRecord`],
//! which spells out the field mapping once per type at compile time.

use std::collections::BTreeMap;

/// Row key under which every counter record is stored.
pub const COUNTER_ROW_KEY: &str = "hi";

/// Property holding a counter record's high-water mark.
pub const COUNTER_MAX_PROPERTY: &str = "max";

/// A single typed property value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", content = "value"))]
pub enum EntityProperty {
    String(String),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Bool(bool),
    Binary(Vec<u8>),
    /// Milliseconds since the Unix epoch, UTC.
    DateTime(i64),
    Guid([u8; 16]),
}

impl EntityProperty {
    /// Name of the variant, used in diagnostics.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "String",
            Self::Int32(_) => "Int32",
            Self::Int64(_) => "Int64",
            Self::Double(_) => "Double",
            Self::Bool(_) => "Bool",
            Self::Binary(_) => "Binary",
            Self::DateTime(_) => "DateTime",
            Self::Guid(_) => "Guid",
        }
    }

    /// Widens integer properties to `i64`.
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(v) => Some(*v as i64),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A row in the backing store, addressed by `(partition_key, row_key)`.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Entity {
    pub partition_key: String,
    pub row_key: String,
    pub properties: BTreeMap<String, EntityProperty>,
}

impl Entity {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Sets `name` to `value`, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: EntityProperty) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&EntityProperty> {
        self.properties.get(name)
    }

    /// Reads an integer property, widening `Int32` to `i64`.
    ///
    /// # Errors
    ///
    /// Returns [`MarshalError::TypeMismatch`] if the property exists but is
    /// not an integer. A missing property is `Ok(None)`.
    pub fn get_i64(&self, name: &str) -> Result<Option<i64>, MarshalError> {
        match self.properties.get(name) {
            None => Ok(None),
            Some(prop) => prop.as_i64().map(Some).ok_or_else(|| MarshalError::TypeMismatch {
                property: name.to_owned(),
                expected: "Int64",
                found: prop.type_name(),
            }),
        }
    }
}

/// Failure to map an [`Entity`] onto a typed record.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MarshalError {
    #[error("missing property '{0}'")]
    MissingProperty(String),

    #[error("property '{property}' has type {found}, expected {expected}")]
    TypeMismatch {
        property: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("property '{property}' is out of range")]
    OutOfRange { property: String },
}

/// Explicit mapping between a typed record and its stored [`Entity`].
///
/// Implemented once per record type instead of discovering fields at runtime.
pub trait TableRecord: Sized {
    fn partition_key(&self) -> &str;

    fn row_key(&self) -> &str;

    /// Encodes the record, including its keys.
    ///
    /// # Errors
    ///
    /// Returns a [`MarshalError`] if a field cannot be represented by its
    /// stored property type.
    fn write_entity(&self) -> Result<Entity, MarshalError>;

    /// Decodes a stored row.
    ///
    /// # Errors
    ///
    /// Returns a [`MarshalError`] if a required property is missing, has the
    /// wrong type, or holds a value the record cannot represent.
    fn read_entity(entity: &Entity) -> Result<Self, MarshalError>;
}

/// The durable high-water mark of one id sequence.
///
/// Stored as `PartitionKey = key`, `RowKey = "hi"` with an `Int64` property
/// `max`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterRecord {
    pub key: String,
    pub current_max: u64,
}

impl CounterRecord {
    pub fn new(key: impl Into<String>, current_max: u64) -> Self {
        Self {
            key: key.into(),
            current_max,
        }
    }
}

impl TableRecord for CounterRecord {
    fn partition_key(&self) -> &str {
        &self.key
    }

    fn row_key(&self) -> &str {
        COUNTER_ROW_KEY
    }

    fn write_entity(&self) -> Result<Entity, MarshalError> {
        let max = i64::try_from(self.current_max).map_err(|_| MarshalError::OutOfRange {
            property: COUNTER_MAX_PROPERTY.to_owned(),
        })?;
        Ok(Entity::new(self.key.clone(), COUNTER_ROW_KEY)
            .with(COUNTER_MAX_PROPERTY, EntityProperty::Int64(max)))
    }

    fn read_entity(entity: &Entity) -> Result<Self, MarshalError> {
        // A row without `max` counts as never reserved.
        let max = entity.get_i64(COUNTER_MAX_PROPERTY)?.unwrap_or(0);
        let current_max = u64::try_from(max).map_err(|_| MarshalError::OutOfRange {
            property: COUNTER_MAX_PROPERTY.to_owned(),
        })?;
        Ok(Self {
            key: entity.partition_key.clone(),
            current_max,
        })
    }
}
