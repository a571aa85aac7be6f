//! Normalization of legacy timestamped records.
//!
//! Stored values were written by several generations of the application,
//! so the timestamp may appear under `timestamp`, `created_at`, or
//! `date`, encoded as epoch milliseconds or an RFC 3339 string. The
//! variance is handled once, here, at the boundary; the sweep itself only
//! ever sees a normalized timestamp or "unparsable".

use jiff::Timestamp;
use serde_json::Value;

/// Field names checked in order; the first present wins.
const TIMESTAMP_FIELDS: [&str; 3] = ["timestamp", "created_at", "date"];

/// Extracts the record timestamp from a stored JSON value.
///
/// Returns `None` when the value is not an object, carries none of the
/// known fields, or the field's encoding is unrecognized — callers treat
/// all three the same way, as an unparsable record.
#[must_use]
pub fn record_timestamp(value: &Value) -> Option<Timestamp> {
    let object = value.as_object()?;
    let field = TIMESTAMP_FIELDS.iter().find_map(|name| object.get(*name))?;
    match field {
        Value::Number(n) => Timestamp::from_millisecond(n.as_i64()?).ok(),
        Value::String(s) => s.parse::<Timestamp>().ok(),
        _ => None,
    }
}
