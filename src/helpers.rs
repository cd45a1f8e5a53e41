//! Small shared helpers used by the payload adapters.

use serde::Serialize;
use uuid::Uuid;

use crate::engine::GroupKey;

/// Serializes a value to a JSON string, returning an empty string when
/// serialization fails.
///
/// Adapters use this for nested structures that land in text columns.
/// A serialization failure here would mean a payload type that cannot
/// represent itself as JSON, which is a programming error; the row is
/// still written with an empty value rather than dropped.
pub fn as_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Derives the acknowledgment group key from a DAO identifier.
///
/// The key is the big-endian u32 of the UUID's first four bytes. It scopes
/// settlement only; it plays no role in storage layout.
pub fn uuid_group_key(id: &Uuid) -> GroupKey {
    let b = id.as_bytes();
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

/// Current wall-clock time as unix seconds.
pub fn current_time_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
