//! Typed JSON envelope used by the backend's REST API.
//!
//! Plain JSON carries a handful of richer types as tagged objects:
//!
//! | tag        | wire form                                               |
//! |------------|---------------------------------------------------------|
//! | `Date`     | `{"__type":"Date","iso":"2020-01-01T00:00:00.000000Z"}` |
//! | `Bytes`    | `{"__type":"Bytes","base64":"aGVsbG8="}`                |
//! | `Pointer`  | `{"__type":"Pointer","className":..,"objectId":..}`     |
//! | `Relation` | `{"__type":"Relation","className":..}`                  |
//! | `GeoPoint` | `{"__type":"GeoPoint","latitude":..,"longitude":..}`    |
//! | `File`     | `{"__type":"File","name":..,"url":..}` (`url` optional) |
//!
//! Objects carrying `objectId`, `createdAt` and `updatedAt` are full entity
//! records and decode to [`EntityRecord`].
//!
//! ```rust
//! use baas_transport::codec::{self, WireValue};
//!
//! let value = codec::decode(r#"{"__type":"Bytes","base64":"aGVsbG8="}"#, None).unwrap();
//! assert_eq!(value, WireValue::Bytes(b"hello".to_vec()));
//! assert_eq!(codec::encode_to_string(&value).unwrap(), r#"{"__type":"Bytes","base64":"aGVsbG8="}"#);
//! ```

mod decode;
mod encode;
mod value;

pub use decode::{decode, decode_response, ClassScoping, Decoder};
pub use encode::{encode, encode_serializable, encode_to_string};
pub use value::{EntityRecord, File, GeoPoint, Pointer, RecordKind, Relation, WireValue};

use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::errors::{Error, Result};

/// Formats a timestamp as the wire's ISO-8601 form: UTC, microseconds, `Z`.
pub fn format_timestamp(value: &OffsetDateTime) -> Result<String> {
    value
        .to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
        ))
        .map_err(|e| Error::Encode(format!("cannot format timestamp: {e}")))
}

/// Parses a wire timestamp. Any number of fractional digits is accepted.
pub fn parse_timestamp(value: &str) -> Result<OffsetDateTime> {
    PrimitiveDateTime::parse(
        value,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]Z"),
    )
    .map(PrimitiveDateTime::assume_utc)
    .map_err(|e| Error::Decode(format!("bad timestamp {value:?}: {e}")))
}
