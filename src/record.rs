//! Source record decoding and mapping to the destination row shape.
//!
//! A [`SourceRecord`] is the document as the authoring system wrote it, with
//! the timestamp kept raw because historical documents carry it as a BSON
//! datetime, an RFC 3339 string, epoch milliseconds, or garbage. Mapping to a
//! [`QueryRow`] is a pure function: well-formed records never fail, and a
//! missing or unparseable timestamp becomes the unknown-time sentinel (NULL
//! in the destination) instead of silently defaulting to the current time.

use chrono::{DateTime, TimeZone, Utc};
use mongodb::bson::{Bson, Document};
use serde::Serialize;

use crate::error::MapError;

/// A patient question document as read from the source collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub conversation_id: String,
    pub patient_id: String,
    pub question: String,
    pub image_url: Option<String>,
    pub timestamp: Option<Bson>,
}

/// The destination tuple, keyed by `conversation_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRow {
    pub conversation_id: String,
    pub patient_id: String,
    pub question: String,
    pub image_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl SourceRecord {
    /// Decode a raw source document. Fails per-document, never per-batch:
    /// the caller skips the offending record and continues.
    pub fn from_document(doc: &Document) -> Result<Self, MapError> {
        Ok(Self {
            conversation_id: required_string(doc, "conversation_id")?,
            patient_id: required_string(doc, "patient_id")?,
            question: required_string(doc, "question")?,
            image_url: optional_string(doc, "image_url"),
            timestamp: doc.get("timestamp").cloned(),
        })
    }

    /// Convert into the destination row shape.
    pub fn map(self) -> QueryRow {
        let created_at = self.timestamp.as_ref().and_then(parse_timestamp);
        QueryRow {
            conversation_id: self.conversation_id,
            patient_id: self.patient_id,
            question: self.question,
            image_url: self.image_url,
            created_at,
        }
    }
}

fn required_string(doc: &Document, field: &'static str) -> Result<String, MapError> {
    match doc.get(field) {
        Some(Bson::String(s)) => Ok(s.clone()),
        Some(other) => Err(MapError::InvalidField {
            field,
            value: other.clone(),
        }),
        None => Err(MapError::MissingField(field)),
    }
}

// Absent and empty are both treated as "no image", matching how the
// authoring system writes documents without an attachment.
fn optional_string(doc: &Document, field: &str) -> Option<String> {
    match doc.get(field) {
        Some(Bson::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Normalize the timestamp spellings seen in source documents to UTC.
/// Anything unrecognized maps to `None`, the unknown-time sentinel.
fn parse_timestamp(value: &Bson) -> Option<DateTime<Utc>> {
    match value {
        Bson::DateTime(dt) => Some(dt.to_chrono()),
        Bson::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Bson::Int64(ms) => Utc.timestamp_millis_opt(*ms).single(),
        Bson::Int32(ms) => Utc.timestamp_millis_opt(*ms as i64).single(),
        Bson::Double(ms) if ms.is_finite() => Utc.timestamp_millis_opt(*ms as i64).single(),
        Bson::Timestamp(ts) => DateTime::from_timestamp(ts.time as i64, 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn full_document() -> Document {
        doc! {
            "conversation_id": "conv-1",
            "patient_id": "patient-9",
            "question": "Is this rash normal?",
            "image_url": "https://cdn.example.com/rash.jpg",
            "timestamp": "2024-03-01T10:30:00Z",
        }
    }

    #[test]
    fn decodes_full_document() {
        let record = SourceRecord::from_document(&full_document()).unwrap();
        assert_eq!(record.conversation_id, "conv-1");
        assert_eq!(record.patient_id, "patient-9");
        assert_eq!(
            record.image_url.as_deref(),
            Some("https://cdn.example.com/rash.jpg")
        );
    }

    #[test]
    fn missing_required_field_is_a_map_error() {
        let mut doc = full_document();
        doc.remove("question");
        let err = SourceRecord::from_document(&doc).unwrap_err();
        assert!(matches!(err, MapError::MissingField("question")));
    }

    #[test]
    fn wrong_field_type_is_a_map_error() {
        let mut doc = full_document();
        doc.insert("patient_id", 42);
        let err = SourceRecord::from_document(&doc).unwrap_err();
        assert!(matches!(
            err,
            MapError::InvalidField {
                field: "patient_id",
                ..
            }
        ));
    }

    #[test]
    fn rfc3339_timestamp_maps_to_utc() {
        let row = SourceRecord::from_document(&full_document()).unwrap().map();
        assert_eq!(
            row.created_at.unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap()
        );
    }

    #[test]
    fn bson_datetime_timestamp_maps_to_utc() {
        let mut doc = full_document();
        let expected = Utc.with_ymd_and_hms(2023, 12, 24, 8, 0, 0).unwrap();
        doc.insert(
            "timestamp",
            Bson::DateTime(mongodb::bson::DateTime::from_chrono(expected)),
        );
        let row = SourceRecord::from_document(&doc).unwrap().map();
        assert_eq!(row.created_at.unwrap(), expected);
    }

    #[test]
    fn epoch_millis_timestamp_maps_to_utc() {
        let mut doc = full_document();
        doc.insert("timestamp", 1_709_287_800_000_i64);
        let row = SourceRecord::from_document(&doc).unwrap().map();
        assert_eq!(
            row.created_at.unwrap(),
            Utc.timestamp_millis_opt(1_709_287_800_000).unwrap()
        );
    }

    #[test]
    fn missing_timestamp_maps_to_sentinel() {
        let mut doc = full_document();
        doc.remove("timestamp");
        let row = SourceRecord::from_document(&doc).unwrap().map();
        assert_eq!(row.created_at, None);
    }

    #[test]
    fn malformed_timestamp_maps_to_sentinel_without_panicking() {
        for bad in [
            Bson::String("tomorrow-ish".to_string()),
            Bson::Boolean(true),
            Bson::Null,
            Bson::Double(f64::NAN),
        ] {
            let mut doc = full_document();
            doc.insert("timestamp", bad);
            let row = SourceRecord::from_document(&doc).unwrap().map();
            assert_eq!(row.created_at, None);
        }
    }

    #[test]
    fn empty_image_url_is_absent() {
        let mut doc = full_document();
        doc.insert("image_url", "");
        let record = SourceRecord::from_document(&doc).unwrap();
        assert_eq!(record.image_url, None);
    }

    #[test]
    fn mapping_is_deterministic() {
        let a = SourceRecord::from_document(&full_document()).unwrap().map();
        let b = SourceRecord::from_document(&full_document()).unwrap().map();
        assert_eq!(a, b);
    }
}
