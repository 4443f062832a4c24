//! Mutation records and their persisted encoding.

use crate::error::{OutboxError, OutboxResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Kind of mutation, mapped to a network verb at replay time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutationKind {
    /// Creates a resource.
    Create,
    /// Partially updates a resource.
    Update,
    /// Deletes a resource.
    Delete,
}

impl MutationKind {
    /// Returns the HTTP method this kind replays as.
    pub fn http_method(&self) -> &'static str {
        match self {
            MutationKind::Create => "POST",
            MutationKind::Update => "PATCH",
            MutationKind::Delete => "DELETE",
        }
    }

    /// Returns true if requests of this kind carry a body.
    pub fn has_body(&self) -> bool {
        !matches!(self, MutationKind::Delete)
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::Create => "CREATE",
            MutationKind::Update => "UPDATE",
            MutationKind::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Unique identifier of a queued mutation.
///
/// Also serves as the idempotency key sent with replayed creates.
///
/// Persisted as hyphenated text so the encoding does not depend on
/// whether the codec is human-readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct OperationId(Uuid);

impl OperationId {
    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the idempotency key derived from this identifier.
    pub fn idempotency_key(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::generate()
    }
}

impl From<OperationId> for String {
    fn from(id: OperationId) -> Self {
        id.idempotency_key()
    }
}

impl TryFrom<String> for OperationId {
    type Error = uuid::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Uuid::parse_str(&value).map(Self)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One queued intent to change remote state.
///
/// Only `kind` and `target` are required when decoding; every other field
/// defaults so records written by older versions still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    /// Unique identifier assigned at enqueue time.
    #[serde(default)]
    pub id: OperationId,
    /// Create, update or delete.
    pub kind: MutationKind,
    /// Logical resource path the mutation applies to.
    pub target: String,
    /// Opaque domain data.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Milliseconds since the Unix epoch at enqueue time.
    #[serde(default)]
    pub enqueued_at: u64,
    /// Failed replay attempts so far.
    #[serde(default)]
    pub attempts: u32,
}

impl MutationRecord {
    /// Creates a fresh record with zero attempts.
    pub fn new(kind: MutationKind, target: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: OperationId::generate(),
            kind,
            target: target.into(),
            payload,
            enqueued_at: now_millis(),
            attempts: 0,
        }
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Encodes the whole log as a CBOR array.
pub fn encode_log(records: &[MutationRecord]) -> OutboxResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(records, &mut bytes)
        .map_err(|e| OutboxError::Codec(format!("failed to encode operation log: {}", e)))?;
    Ok(bytes)
}

/// Result of decoding a persisted log.
#[derive(Debug, Default)]
pub struct DecodedLog {
    /// Records that decoded cleanly, in persisted order.
    pub records: Vec<MutationRecord>,
    /// Positions of elements that could not be decoded, with the reason.
    pub skipped: Vec<(usize, String)>,
}

/// Decodes a persisted log, skipping malformed elements individually.
///
/// # Errors
///
/// Returns [`OutboxError::Codec`] only when the outer array itself is
/// unreadable.
pub fn decode_log(bytes: &[u8]) -> OutboxResult<DecodedLog> {
    let elements: Vec<ciborium::Value> = ciborium::from_reader(bytes)
        .map_err(|e| OutboxError::Codec(format!("operation log is not a CBOR array: {}", e)))?;

    let mut decoded = DecodedLog::default();
    for (index, element) in elements.into_iter().enumerate() {
        match element.deserialized::<MutationRecord>() {
            Ok(record) => decoded.records.push(record),
            Err(e) => decoded.skipped.push((index, e.to_string())),
        }
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::Value;
    use serde_json::json;

    fn text(s: &str) -> Value {
        Value::Text(s.into())
    }

    #[test]
    fn kind_verbs() {
        assert_eq!(MutationKind::Create.http_method(), "POST");
        assert_eq!(MutationKind::Update.http_method(), "PATCH");
        assert_eq!(MutationKind::Delete.http_method(), "DELETE");
        assert!(!MutationKind::Delete.has_body());
        assert_eq!(MutationKind::Update.to_string(), "UPDATE");
    }

    #[test]
    fn new_record_starts_fresh() {
        let record = MutationRecord::new(MutationKind::Create, "/api/tickets", json!({"type": "single"}));
        assert_eq!(record.attempts, 0);
        assert!(record.enqueued_at > 0);
        assert_ne!(record.id, MutationRecord::new(MutationKind::Create, "/x", json!(null)).id);
    }

    #[test]
    fn idempotency_key_is_stable() {
        let record = MutationRecord::new(MutationKind::Create, "/api/tickets", json!({}));
        assert_eq!(record.id.idempotency_key(), record.id.idempotency_key());
        assert_eq!(record.id.idempotency_key(), record.id.to_string());
    }

    #[test]
    fn log_preserves_order_and_fields() {
        let mut first = MutationRecord::new(MutationKind::Create, "/api/tickets", json!({"type": "single", "zones": [1, 2]}));
        first.attempts = 2;
        let second = MutationRecord::new(MutationKind::Delete, "/api/tickets/9", serde_json::Value::Null);

        let bytes = encode_log(&[first.clone(), second.clone()]).unwrap();
        let decoded = decode_log(&bytes).unwrap();

        assert!(decoded.skipped.is_empty());
        assert_eq!(decoded.records, vec![first, second]);
    }

    #[test]
    fn missing_optional_fields_default() {
        let legacy = Value::Array(vec![Value::Map(vec![
            (text("kind"), text("UPDATE")),
            (text("target"), text("/api/settings")),
        ])]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&legacy, &mut bytes).unwrap();

        let decoded = decode_log(&bytes).unwrap();
        assert_eq!(decoded.records.len(), 1);
        let record = &decoded.records[0];
        assert_eq!(record.kind, MutationKind::Update);
        assert_eq!(record.attempts, 0);
        assert_eq!(record.enqueued_at, 0);
        assert_eq!(record.payload, serde_json::Value::Null);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let newer = Value::Array(vec![Value::Map(vec![
            (text("kind"), text("CREATE")),
            (text("target"), text("/api/feedback")),
            (text("priority"), Value::Integer(7.into())),
        ])]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&newer, &mut bytes).unwrap();

        let decoded = decode_log(&bytes).unwrap();
        assert_eq!(decoded.records.len(), 1);
        assert_eq!(decoded.records[0].target, "/api/feedback");
    }

    #[test]
    fn malformed_elements_are_skipped() {
        let good = MutationRecord::new(MutationKind::Create, "/api/journeys", json!({"from": "A"}));
        let mut elements = vec![Value::Text("garbage".into())];
        elements.push(Value::serialized(&good).unwrap());
        elements.push(Value::Map(vec![(text("kind"), text("TELEPORT")), (text("target"), text("/x"))]));
        let mut bytes = Vec::new();
        ciborium::into_writer(&Value::Array(elements), &mut bytes).unwrap();

        let decoded = decode_log(&bytes).unwrap();
        assert_eq!(decoded.records, vec![good]);
        let positions: Vec<usize> = decoded.skipped.iter().map(|(i, _)| *i).collect();
        assert_eq!(positions, vec![0, 2]);
    }

    #[test]
    fn unreadable_log_is_an_error() {
        assert!(matches!(decode_log(b"\xff\x00not cbor"), Err(OutboxError::Codec(_))));
    }
}
