//! `WireValue` to JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::codec::value::WireValue;
use crate::codec::format_timestamp;
use crate::errors::{Error, Result};

/// Encodes a value, turning tagged types into their wire objects.
pub fn encode(value: &WireValue) -> Result<Value> {
    Ok(match value {
        WireValue::Null => Value::Null,
        WireValue::Bool(b) => Value::Bool(*b),
        WireValue::Number(n) => Value::Number(n.clone()),
        WireValue::String(s) => Value::String(s.clone()),
        WireValue::Array(items) => Value::Array(items.iter().map(encode).collect::<Result<_>>()?),
        WireValue::Object(fields) => Value::Object(encode_fields(fields.iter())?),
        WireValue::Date(ts) => json!({"__type": "Date", "iso": format_timestamp(ts)?}),
        WireValue::Bytes(bytes) => json!({"__type": "Bytes", "base64": STANDARD.encode(bytes)}),
        WireValue::Pointer(p) => json!({
            "__type": "Pointer",
            "className": p.class_name,
            "objectId": p.object_id,
        }),
        WireValue::Relation(r) => json!({"__type": "Relation", "className": r.class_name}),
        WireValue::GeoPoint(g) => json!({
            "__type": "GeoPoint",
            "latitude": finite(g.latitude())?,
            "longitude": finite(g.longitude())?,
        }),
        WireValue::File(f) => {
            let mut file = json!({"__type": "File", "name": f.name});
            if let Some(url) = &f.url {
                file["url"] = Value::String(url.clone());
            }
            file
        }
        WireValue::Entity(record) => {
            let mut fields = encode_fields(record.fields.iter())?;
            fields.insert("objectId".to_string(), Value::String(record.object_id.clone()));
            fields.insert("createdAt".to_string(), Value::String(format_timestamp(&record.created_at)?));
            fields.insert("updatedAt".to_string(), Value::String(format_timestamp(&record.updated_at)?));
            Value::Object(fields)
        }
    })
}

pub fn encode_to_string(value: &WireValue) -> Result<String> {
    Ok(serde_json::to_string(&encode(value)?)?)
}

/// Encodes anything `serde` can serialize as plain JSON. Values JSON cannot
/// represent (maps with non-string keys, say) fail with [`Error::Encode`].
pub fn encode_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Encode(e.to_string()))
}

impl Serialize for WireValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        encode(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

fn encode_fields<'a>(fields: impl Iterator<Item = (&'a String, &'a WireValue)>) -> Result<Map<String, Value>> {
    fields
        .map(|(k, v)| Ok((k.clone(), encode(v)?)))
        .collect()
}

fn finite(value: f64) -> Result<Value> {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| Error::Encode(format!("{value} is not a finite number")))
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use time::macros::datetime;

    use super::*;
    use crate::codec::value::{EntityRecord, File, GeoPoint, Pointer, RecordKind, Relation};

    #[test]
    fn tagged_values_have_exact_wire_form() {
        let date = WireValue::Date(datetime!(2020-01-01 0:00 UTC));
        assert_eq!(
            encode_to_string(&date).unwrap(),
            r#"{"__type":"Date","iso":"2020-01-01T00:00:00.000000Z"}"#
        );

        let pointer = WireValue::Pointer(Pointer {
            class_name: "GameScore".into(),
            object_id: "Ed1nuqPvcm".into(),
        });
        assert_eq!(
            encode_to_string(&pointer).unwrap(),
            r#"{"__type":"Pointer","className":"GameScore","objectId":"Ed1nuqPvcm"}"#
        );

        let relation = WireValue::Relation(Relation { class_name: "Player".into() });
        assert_eq!(encode(&relation).unwrap(), json!({"__type": "Relation", "className": "Player"}));

        let point = WireValue::GeoPoint(GeoPoint::new(40.0, -30.0).unwrap());
        assert_eq!(
            encode(&point).unwrap(),
            json!({"__type": "GeoPoint", "latitude": 40.0, "longitude": -30.0})
        );
    }

    #[test]
    fn file_url_is_optional() {
        let bare = WireValue::File(File { name: "a.png".into(), url: None });
        assert_eq!(encode(&bare).unwrap(), json!({"__type": "File", "name": "a.png"}));

        let full = WireValue::File(File {
            name: "a.png".into(),
            url: Some("https://files.test/a.png".into()),
        });
        assert_eq!(encode(&full).unwrap()["url"], "https://files.test/a.png");
    }

    #[test]
    fn nested_values_are_encoded_recursively() {
        let mut fields = BTreeMap::new();
        fields.insert("blob".to_string(), WireValue::Bytes(vec![1, 2, 3]));
        fields.insert("tags".to_string(), WireValue::Array(vec!["a".into(), WireValue::from(7i64)]));
        let encoded = encode(&WireValue::Object(fields)).unwrap();
        assert_eq!(encoded["blob"], json!({"__type": "Bytes", "base64": "AQID"}));
        assert_eq!(encoded["tags"], json!(["a", 7]));
    }

    #[test]
    fn entity_records_flatten_their_metadata() {
        let mut fields = BTreeMap::new();
        fields.insert("score".to_string(), WireValue::from(1337i64));
        let record = EntityRecord {
            class_name: "GameScore".into(),
            kind: RecordKind::Object,
            object_id: "abc".into(),
            created_at: datetime!(2020-01-01 0:00 UTC),
            updated_at: datetime!(2020-01-02 0:00 UTC),
            fields,
        };
        let encoded = encode(&WireValue::Entity(record)).unwrap();
        assert_eq!(encoded["objectId"], "abc");
        assert_eq!(encoded["createdAt"], "2020-01-01T00:00:00.000000Z");
        assert_eq!(encoded["score"], 1337);
    }

    #[test]
    fn unencodable_serializables_fail() {
        let mut odd = HashMap::new();
        odd.insert((1, 2), "pair keys are not JSON");
        assert!(matches!(encode_serializable(&odd), Err(Error::Encode(_))));
        assert_eq!(encode_serializable(&vec![1, 2]).unwrap(), json!([1, 2]));
    }

    #[test]
    fn wire_values_serialize_through_serde() {
        let value = WireValue::Bytes(b"hi".to_vec());
        assert_eq!(serde_json::to_value(&value).unwrap(), json!({"__type": "Bytes", "base64": "aGk="}));
    }
}
