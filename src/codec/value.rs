//! Values the codec understands.

use std::collections::BTreeMap;

use time::OffsetDateTime;

use crate::errors::{Error, Result};

/// A JSON value enriched with the tagged wire types.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<WireValue>),
    Object(BTreeMap<String, WireValue>),
    Date(OffsetDateTime),
    Bytes(Vec<u8>),
    Pointer(Pointer),
    Relation(Relation),
    GeoPoint(GeoPoint),
    File(File),
    Entity(EntityRecord),
}

impl WireValue {
    /// A number from a float; fails for NaN and infinities, which JSON
    /// cannot carry.
    pub fn float(value: f64) -> Result<WireValue> {
        serde_json::Number::from_f64(value)
            .map(WireValue::Number)
            .ok_or_else(|| Error::Encode(format!("{value} is not a finite number")))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Field lookup on objects and entity records.
    pub fn get(&self, key: &str) -> Option<&WireValue> {
        match self {
            WireValue::Object(map) => map.get(key),
            WireValue::Entity(record) => record.fields.get(key),
            _ => None,
        }
    }
}

/// Reference to an entity by class and id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    pub class_name: String,
    pub object_id: String,
}

/// Relation to entities of one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub class_name: String,
}

/// A named file stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub name: String,
    pub url: Option<String>,
}

/// A latitude/longitude pair, both strictly inside their valid ranges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(latitude > -90.0 && latitude < 90.0) {
            return Err(Error::Decode(format!("latitude {latitude} outside (-90, 90)")));
        }
        if !(longitude > -180.0 && longitude < 180.0) {
            return Err(Error::Decode(format!("longitude {longitude} outside (-180, 180)")));
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Reserved system classes are told apart from user-defined ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Object,
    User,
    Role,
    Installation,
}

impl RecordKind {
    pub fn from_class_name(class_name: &str) -> Self {
        match class_name {
            "_User" => RecordKind::User,
            "_Role" => RecordKind::Role,
            "_Installation" => RecordKind::Installation,
            _ => RecordKind::Object,
        }
    }
}

/// A stored entity as returned by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub class_name: String,
    pub kind: RecordKind,
    pub object_id: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    /// Every other field, already decoded.
    pub fields: BTreeMap<String, WireValue>,
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        WireValue::Bool(value)
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        WireValue::Number(value.into())
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        WireValue::String(value.to_string())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        WireValue::String(value)
    }
}

impl From<OffsetDateTime> for WireValue {
    fn from(value: OffsetDateTime) -> Self {
        WireValue::Date(value)
    }
}

impl From<Vec<u8>> for WireValue {
    fn from(value: Vec<u8>) -> Self {
        WireValue::Bytes(value)
    }
}

impl From<Pointer> for WireValue {
    fn from(value: Pointer) -> Self {
        WireValue::Pointer(value)
    }
}

impl From<Relation> for WireValue {
    fn from(value: Relation) -> Self {
        WireValue::Relation(value)
    }
}

impl From<GeoPoint> for WireValue {
    fn from(value: GeoPoint) -> Self {
        WireValue::GeoPoint(value)
    }
}

impl From<File> for WireValue {
    fn from(value: File) -> Self {
        WireValue::File(value)
    }
}

impl From<EntityRecord> for WireValue {
    fn from(value: EntityRecord) -> Self {
        WireValue::Entity(value)
    }
}

/// Plain JSON, no tag rehydration.
impl From<serde_json::Value> for WireValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => WireValue::Null,
            serde_json::Value::Bool(b) => WireValue::Bool(b),
            serde_json::Value::Number(n) => WireValue::Number(n),
            serde_json::Value::String(s) => WireValue::String(s),
            serde_json::Value::Array(items) => {
                WireValue::Array(items.into_iter().map(WireValue::from).collect())
            }
            serde_json::Value::Object(map) => WireValue::Object(
                map.into_iter().map(|(k, v)| (k, WireValue::from(v))).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geopoint_bounds_are_exclusive() {
        assert!(GeoPoint::new(89.9, 179.9).is_ok());
        assert!(GeoPoint::new(90.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.0).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn system_classes_are_recognized() {
        assert_eq!(RecordKind::from_class_name("_User"), RecordKind::User);
        assert_eq!(RecordKind::from_class_name("_Role"), RecordKind::Role);
        assert_eq!(RecordKind::from_class_name("GameScore"), RecordKind::Object);
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        assert!(WireValue::float(1.5).is_ok());
        assert!(matches!(WireValue::float(f64::INFINITY), Err(Error::Encode(_))));
    }
}
