//! Audit record representation

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::engine::xml::Element;

/// On-disk timestamp format (second resolution)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One audit document: a flat field map plus id and timestamps.
///
/// Field values are scalar only (`Value::String` or `Value::Null`); the
/// store does not support nested documents. A `Null` value survives in
/// memory and in JSON summaries but flattens to empty text on the tree,
/// so it comes back as `""` after a persistence round-trip.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    id: Option<String>,
    fields: Map<String, Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: None,
            fields: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Id accessor; empty/duplicate checks are the store's job
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: &str) {
        self.id = Some(id.to_string());
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Replace the entire field map and refresh `updated_at`
    pub fn set_fields(&mut self, fields: Map<String, Value>) {
        self.fields = fields;
        self.updated_at = Utc::now();
    }

    /// Field value, or `None` when the field is absent or null
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Upsert a single field and refresh `updated_at`
    pub fn set(&mut self, key: &str, value: Option<&str>) {
        let value = match value {
            Some(v) => Value::String(v.to_string()),
            None => Value::Null,
        };
        self.fields.insert(key.to_string(), value);
        self.updated_at = Utc::now();
    }

    /// Plain structured value for serialization to clients
    pub fn to_summary(&self) -> Value {
        serde_json::json!({
            "id": &self.id,
            "fields": &self.fields,
            "created_at": self.created_at.format(TIMESTAMP_FORMAT).to_string(),
            "updated_at": self.updated_at.format(TIMESTAMP_FORMAT).to_string(),
        })
    }

    /// Build the tree node for this record: id and timestamps as
    /// attributes, one `field` child per entry. Null values serialize
    /// as empty text.
    pub fn to_node(&self) -> Element {
        let mut node = Element::new("record");
        node.set_attr("id", self.id.as_deref().unwrap_or(""));
        node.set_attr(
            "created_at",
            &self.created_at.format(TIMESTAMP_FORMAT).to_string(),
        );
        node.set_attr(
            "updated_at",
            &self.updated_at.format(TIMESTAMP_FORMAT).to_string(),
        );

        for (name, value) in &self.fields {
            let mut field = Element::new("field");
            field.set_attr("name", name);
            field.text = value_to_text(value);
            node.children.push(field);
        }

        node
    }

    /// Inverse of [`to_node`](Self::to_node): repopulate from a `record`
    /// element's attributes and `field` children.
    pub fn from_node(node: &Element) -> Self {
        let mut fields = Map::new();
        for field in node.children_named("field") {
            if let Some(name) = field.attr("name") {
                fields.insert(name.to_string(), Value::String(field.text.clone()));
            }
        }

        Self {
            id: node.attr("id").filter(|s| !s.is_empty()).map(String::from),
            fields,
            created_at: parse_timestamp(node.attr("created_at")),
            updated_at: parse_timestamp(node.attr("updated_at")),
        }
    }
}

impl Default for AuditRecord {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_timestamp(value: Option<&str>) -> DateTime<Utc> {
    value
        .and_then(|s| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok())
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Generate a record id: `AUD<yyyymmdd>_<suffix>`, where the suffix is a
/// millisecond timestamp plus UUIDv4 entropy in Crockford base32. Sortable
/// by creation time, collision probability negligible within a process.
pub fn generate_record_id() -> String {
    const CHARS: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
    let now = Utc::now();

    let mut suffix = String::with_capacity(26);
    let ts = now.timestamp_millis() as u64;
    for i in (0..10).rev() {
        suffix.push(CHARS[((ts >> (i * 5)) & 0x1f) as usize] as char);
    }
    let entropy = u128::from_be_bytes(*Uuid::new_v4().as_bytes());
    for i in (0..16).rev() {
        suffix.push(CHARS[((entropy >> (i * 5)) & 0x1f) as usize] as char);
    }

    format!("AUD{}_{}", now.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_round_trip() {
        let mut record = AuditRecord::new();
        record.set_id("AUD1");
        record.set("gender", Some("female"));
        record.set("note", Some("a <b> & \"c\" 'd'"));
        record.set("empty", Some(""));
        record.set("missing-value", None);

        let restored = AuditRecord::from_node(&record.to_node());
        assert_eq!(restored.id(), Some("AUD1"));
        assert_eq!(restored.get("gender"), Some("female"));
        assert_eq!(restored.get("note"), Some("a <b> & \"c\" 'd'"));
        assert_eq!(restored.get("empty"), Some(""));
        // null flattens to empty text at the tree boundary
        assert_eq!(restored.get("missing-value"), Some(""));
    }

    #[test]
    fn test_get_absent_is_none() {
        let record = AuditRecord::new();
        assert_eq!(record.get("nope"), None);
    }

    #[test]
    fn test_set_refreshes_updated_at() {
        let mut record = AuditRecord::new();
        let before = record.updated_at();
        std::thread::sleep(std::time::Duration::from_millis(5));
        record.set("k", Some("v"));
        assert!(record.updated_at() >= before);
    }

    #[test]
    fn test_generated_ids_unique_and_sortable() {
        let ids: Vec<String> = (0..100).map(|_| generate_record_id()).collect();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
        assert!(ids[0].starts_with("AUD"));
    }
}
