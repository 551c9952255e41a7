//! Recognition payload normalization.

use crate::client::RemoteError;
use facelink_core::RecognitionRecord;
use serde_json::Value;

/// Parse a recognition response body into records.
///
/// Accepts either a bare array of records or an object carrying them in a
/// `recognitions` array. Anything else is malformed. Entries that do not
/// parse as a record are skipped; the rest of the list is kept.
pub fn parse_recognitions(body: &[u8]) -> Result<Vec<RecognitionRecord>, RemoteError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RemoteError::Malformed(format!("invalid JSON: {e}")))?;

    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("recognitions") {
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return Err(RemoteError::Malformed(format!(
                    "`recognitions` is not an array: {other}"
                )))
            }
            None => {
                return Err(RemoteError::Malformed(
                    "object without a `recognitions` field".into(),
                ))
            }
        },
        other => {
            return Err(RemoteError::Malformed(format!(
                "expected an array or object, got {other}"
            )))
        }
    };

    let total = entries.len();
    let records: Vec<RecognitionRecord> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<RecognitionRecord>(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping malformed recognition record");
                None
            }
        })
        .collect();

    if records.len() < total {
        tracing::debug!(kept = records.len(), total, "recognition response partially parsed");
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str =
        r#"{"name":"Ana","clerk_id":"user_1","confidence":0.31,"coords":[28,28,12,12]}"#;

    #[test]
    fn test_bare_array() {
        let body = format!("[{RECORD}]");
        let records = parse_recognitions(body.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity_id, "user_1");
        assert_eq!(records[0].coords, [28.0, 28.0, 12.0, 12.0]);
    }

    #[test]
    fn test_wrapped_object() {
        let body = format!(r#"{{"recognitions":[{RECORD},{RECORD}],"elapsed_ms":12}}"#);
        assert_eq!(parse_recognitions(body.as_bytes()).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_array_is_valid() {
        assert!(parse_recognitions(b"[]").unwrap().is_empty());
        assert!(parse_recognitions(br#"{"recognitions":[]}"#).unwrap().is_empty());
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let err = parse_recognitions(br#"{"faces":[]}"#).unwrap_err();
        assert!(matches!(err, RemoteError::Malformed(_)));
    }

    #[test]
    fn test_non_array_recognitions_is_malformed() {
        let err = parse_recognitions(br#"{"recognitions":{"name":"x"}}"#).unwrap_err();
        assert!(matches!(err, RemoteError::Malformed(_)));
    }

    #[test]
    fn test_scalar_and_garbage_are_malformed() {
        assert!(matches!(parse_recognitions(b"42"), Err(RemoteError::Malformed(_))));
        assert!(matches!(parse_recognitions(b"<html>"), Err(RemoteError::Malformed(_))));
    }

    #[test]
    fn test_bad_geometry_skips_only_that_record() {
        let short = format!(
            r#"[{RECORD},{{"name":"Bo","clerk_id":"user_2","confidence":0.2,"coords":[28,28,12]}}]"#
        );
        let records = parse_recognitions(short.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity_id, "user_1");

        let null_coord = format!(
            r#"{{"recognitions":[{{"name":"Bo","clerk_id":"user_2","confidence":0.2,"coords":[null,28,12,12]}},{RECORD}]}}"#
        );
        let records = parse_recognitions(null_coord.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity_id, "user_1");
    }

    #[test]
    fn test_records_missing_fields_are_skipped() {
        let body = format!(
            r#"[{{"name":"a","clerk_id":"b","confidence":0.1}},{{"name":"c","clerk_id":"d","coords":[1,2,3,4]}},{RECORD},42]"#
        );
        let records = parse_recognitions(body.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity_label, "Ana");
    }

    #[test]
    fn test_all_records_bad_yields_empty_batch() {
        let records =
            parse_recognitions(br#"[{"name":"a","clerk_id":"b","confidence":0.1,"coords":[1]}]"#).unwrap();
        assert!(records.is_empty());
    }
}
