//! JSON to `WireValue`.
//!
//! Decoding runs bottom-up: an object's fields are decoded before the object
//! itself is inspected, so tagged values nested inside an entity record are
//! already rehydrated when the record is built.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use time::OffsetDateTime;

use crate::codec::parse_timestamp;
use crate::codec::value::{EntityRecord, File, GeoPoint, Pointer, RecordKind, Relation, WireValue};
use crate::errors::{Error, Result};
use crate::net::Response;

const ENTITY_KEYS: [&str; 3] = ["objectId", "createdAt", "updatedAt"];

/// How the class name of entity records is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassScoping {
    /// One class name per decode call: the supplied expected class, or else
    /// the `className` of the first decoded object that carries one. Every
    /// entity record of the call gets that class.
    #[default]
    FirstObject,
    /// Each record uses its own `className`, falling back to the supplied
    /// expected class.
    PerRecord,
}

#[derive(Debug, Clone, Default)]
pub struct Decoder {
    expected_class: Option<String>,
    scoping: ClassScoping,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn per_record() -> Self {
        Self {
            scoping: ClassScoping::PerRecord,
            ..Self::default()
        }
    }

    pub fn expected_class(mut self, class_name: impl Into<String>) -> Self {
        self.expected_class = Some(class_name.into());
        self
    }

    pub fn decode_str(&self, text: &str) -> Result<WireValue> {
        self.decode_value(serde_json::from_str(text)?)
    }

    pub fn decode_value(&self, value: Value) -> Result<WireValue> {
        let mut state = State {
            class_name: self.expected_class.clone(),
            expected_class: self.expected_class.as_deref(),
            scoping: self.scoping,
        };
        state.rehydrate(value)
    }
}

/// Decodes `text` with first-object class scoping.
pub fn decode(text: &str, expected_class_name: Option<&str>) -> Result<WireValue> {
    let mut decoder = Decoder::new();
    decoder.expected_class = expected_class_name.map(str::to_string);
    decoder.decode_str(text)
}

/// Decodes the JSON body of `response`.
pub fn decode_response(response: &mut Response, expected_class_name: Option<&str>) -> Result<WireValue> {
    let mut decoder = Decoder::new();
    decoder.expected_class = expected_class_name.map(str::to_string);
    decoder.decode_value(response.json()?)
}

struct State<'d> {
    /// Class fixed for the whole call under `FirstObject`.
    class_name: Option<String>,
    expected_class: Option<&'d str>,
    scoping: ClassScoping,
}

impl State<'_> {
    fn rehydrate(&mut self, value: Value) -> Result<WireValue> {
        Ok(match value {
            Value::Null => WireValue::Null,
            Value::Bool(b) => WireValue::Bool(b),
            Value::Number(n) => WireValue::Number(n),
            Value::String(s) => WireValue::String(s),
            Value::Array(items) => WireValue::Array(
                items
                    .into_iter()
                    .map(|item| self.rehydrate(item))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => {
                let mut fields = BTreeMap::new();
                for (key, value) in map {
                    let value = self.rehydrate(value)?;
                    fields.insert(key, value);
                }
                self.object(fields)?
            }
        })
    }

    fn object(&mut self, fields: BTreeMap<String, WireValue>) -> Result<WireValue> {
        if self.scoping == ClassScoping::FirstObject && self.class_name.is_none() {
            if let Some(name) = fields.get("className").and_then(WireValue::as_str) {
                self.class_name = Some(name.to_string());
            }
        }

        if ENTITY_KEYS.iter().all(|key| fields.contains_key(*key)) {
            return self.entity(fields).map(WireValue::Entity);
        }

        let tag = fields.get("__type").and_then(WireValue::as_str).map(str::to_string);
        Ok(match tag.as_deref() {
            Some("Pointer") => WireValue::Pointer(Pointer {
                class_name: required_str(&fields, "Pointer", "className")?,
                object_id: required_str(&fields, "Pointer", "objectId")?,
            }),
            Some("Date") => WireValue::Date(parse_timestamp(&required_str(&fields, "Date", "iso")?)?),
            Some("Bytes") => {
                let encoded = required_str(&fields, "Bytes", "base64")?;
                let bytes = STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| Error::Decode(format!("bad base64 in Bytes: {e}")))?;
                WireValue::Bytes(bytes)
            }
            Some("Relation") => WireValue::Relation(Relation {
                class_name: required_str(&fields, "Relation", "className")?,
            }),
            Some("GeoPoint") => WireValue::GeoPoint(GeoPoint::new(
                required_f64(&fields, "GeoPoint", "latitude")?,
                required_f64(&fields, "GeoPoint", "longitude")?,
            )?),
            Some("File") => WireValue::File(File {
                name: required_str(&fields, "File", "name")?,
                url: fields.get("url").and_then(WireValue::as_str).map(str::to_string),
            }),
            // unknown tags stay plain objects
            _ => WireValue::Object(fields),
        })
    }

    fn entity(&self, mut fields: BTreeMap<String, WireValue>) -> Result<EntityRecord> {
        let class_name = match self.scoping {
            ClassScoping::FirstObject => self.class_name.clone(),
            ClassScoping::PerRecord => fields
                .get("className")
                .and_then(WireValue::as_str)
                .or(self.expected_class)
                .map(str::to_string),
        }
        .ok_or_else(|| Error::Decode("entity record without a class name".to_string()))?;

        let object_id = match fields.remove("objectId") {
            Some(WireValue::String(id)) => id,
            other => return Err(Error::Decode(format!("objectId must be a string, got {other:?}"))),
        };
        let created_at = timestamp_field(fields.remove("createdAt"), "createdAt")?;
        let updated_at = timestamp_field(fields.remove("updatedAt"), "updatedAt")?;

        Ok(EntityRecord {
            kind: RecordKind::from_class_name(&class_name),
            class_name,
            object_id,
            created_at,
            updated_at,
            fields,
        })
    }
}

fn timestamp_field(value: Option<WireValue>, key: &str) -> Result<OffsetDateTime> {
    match value {
        Some(WireValue::String(s)) => parse_timestamp(&s),
        Some(WireValue::Date(ts)) => Ok(ts),
        other => Err(Error::Decode(format!("{key} must be a timestamp, got {other:?}"))),
    }
}

fn required_str(fields: &BTreeMap<String, WireValue>, tag: &str, key: &str) -> Result<String> {
    fields
        .get(key)
        .and_then(WireValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Decode(format!("{tag} without string field {key:?}")))
}

fn required_f64(fields: &BTreeMap<String, WireValue>, tag: &str, key: &str) -> Result<f64> {
    fields
        .get(key)
        .and_then(WireValue::as_f64)
        .ok_or_else(|| Error::Decode(format!("{tag} without numeric field {key:?}")))
}
