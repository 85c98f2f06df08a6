//! Response envelope normalisation
//!
//! The provider wraps every payload in `{"d": ...}`. Lists arrive as
//! `{"d": {"results": [...], "__next": "<url>"}}`, single entities as
//! `{"d": {...}}`. Errors use `{"error": {"message": {"value": "..."}}}`.

use ledgerlink_domain::{Cursor, LedgerError, Result};
use serde_json::Value;

const DATA_KEY: &str = "d";
const RESULTS_KEY: &str = "results";
const NEXT_KEY: &str = "__next";

/// Payload and continuation cursor extracted from a response body.
#[derive(Debug, Clone, PartialEq)]
pub struct Unwrapped {
    /// `None` for empty bodies (e.g. 204 No Content)
    pub payload: Option<Value>,
    pub next: Option<Cursor>,
}

impl Unwrapped {
    pub fn empty() -> Self {
        Self { payload: None, next: None }
    }

    /// Payload as a list: arrays as-is, a single object as one element,
    /// nothing as empty.
    pub fn into_items(self) -> Vec<Value> {
        match self.payload {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        }
    }
}

/// Strip the `d` envelope from a successful response body.
///
/// - An empty body yields no payload.
/// - `d.__next`, when present, becomes the cursor. It is never followed here.
/// - `d.results` with exactly one element is collapsed to that element when
///   `collapse_single` is set; otherwise the array is returned.
/// - Without `results`, `d` itself is the payload.
///
/// # Errors
///
/// `LedgerError::Protocol` for invalid JSON or a body without a `d` key.
pub fn unwrap_envelope(body: &str, collapse_single: bool) -> Result<Unwrapped> {
    if body.trim().is_empty() {
        return Ok(Unwrapped::empty());
    }

    let mut root: Value = serde_json::from_str(body)?;
    let data = match root.as_object_mut().and_then(|obj| obj.remove(DATA_KEY)) {
        Some(data) => data,
        None => {
            return Err(LedgerError::Protocol(format!(
                "Response is missing the '{}' envelope",
                DATA_KEY
            )))
        }
    };

    let mut fields = match data {
        Value::Object(fields) => fields,
        other => return Ok(Unwrapped { payload: Some(other), next: None }),
    };

    let next = match fields.get(NEXT_KEY) {
        Some(Value::String(url)) if !url.is_empty() => Some(Cursor::new(url.clone())),
        _ => None,
    };

    let payload = match fields.remove(RESULTS_KEY) {
        Some(Value::Array(mut results)) => {
            if collapse_single && results.len() == 1 {
                results.pop().unwrap_or(Value::Null)
            } else {
                Value::Array(results)
            }
        }
        Some(other) => {
            return Err(LedgerError::Protocol(format!(
                "Expected '{}' to be an array, got {}",
                RESULTS_KEY, other
            )))
        }
        None => Value::Object(fields),
    };

    Ok(Unwrapped { payload: Some(payload), next })
}

/// Best human-readable message in an error response body.
///
/// Looks for `error.message.value`, then `error.message` and
/// `error_description`/`error` as sent by the token endpoint. Falls back to
/// the trimmed raw body.
pub fn extract_error_message(body: &str) -> String {
    let raw = body.trim();
    let Ok(json) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };

    let error = &json["error"];
    let candidates = [
        &error["message"]["value"],
        &error["message"],
        &json["error_description"],
        error,
    ];

    let message = candidates
        .into_iter()
        .find_map(|candidate| candidate.as_str().filter(|s| !s.is_empty()))
        .map(str::to_string);
    message.unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_empty_body_has_no_payload() {
        assert_eq!(unwrap_envelope("", true).unwrap(), Unwrapped::empty());
        assert_eq!(unwrap_envelope("  \n", false).unwrap().into_items(), Vec::<Value>::new());
    }

    /// Validates `unwrap_envelope` behavior for the single-result collapsing
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms one result collapses to the bare object on ordinary calls.
    /// - Confirms it stays an array when collapsing is disabled.
    #[test]
    fn test_single_result_collapsing() {
        let body = r#"{"d":{"results":[{"ID":"a"}]}}"#;

        let collapsed = unwrap_envelope(body, true).unwrap();
        assert_eq!(collapsed.payload, Some(json!({"ID": "a"})));

        let listed = unwrap_envelope(body, false).unwrap();
        assert_eq!(listed.payload, Some(json!([{"ID": "a"}])));
    }

    #[test]
    fn test_multiple_results_are_never_collapsed() {
        let body = r#"{"d":{"results":[{"ID":"a"},{"ID":"b"}]}}"#;
        let unwrapped = unwrap_envelope(body, true).unwrap();
        assert_eq!(unwrapped.into_items().len(), 2);
    }

    /// Validates `unwrap_envelope` behavior for the cursor scenario.
    ///
    /// Assertions:
    /// - Confirms `d.__next` is returned as the cursor.
    /// - Confirms the results array is the payload.
    #[test]
    fn test_next_cursor_is_extracted() {
        let body = r#"{"d":{"results":[{"ID":"a"},{"ID":"b"}],"__next":"https://api/v1/1/crm/Accounts?$skiptoken=guid'b'"}}"#;

        let unwrapped = unwrap_envelope(body, true).unwrap();

        assert_eq!(
            unwrapped.next,
            Some(Cursor::new("https://api/v1/1/crm/Accounts?$skiptoken=guid'b'"))
        );
        assert_eq!(unwrapped.payload, Some(json!([{"ID": "a"}, {"ID": "b"}])));
    }

    #[test]
    fn test_singleton_object_is_returned_as_is() {
        let body = r#"{"d":{"CurrentDivision":17,"FullName":"Ada"}}"#;
        let unwrapped = unwrap_envelope(body, true).unwrap();
        assert_eq!(unwrapped.payload, Some(json!({"CurrentDivision": 17, "FullName": "Ada"})));
        assert_eq!(unwrapped.next, None);
    }

    #[test]
    fn test_missing_envelope_is_protocol_error() {
        let err = unwrap_envelope(r#"{"value":[]}"#, true).unwrap_err();
        assert!(matches!(err, LedgerError::Protocol(ref m) if m.contains("'d'")));

        let err = unwrap_envelope("<html>", true).unwrap_err();
        assert!(matches!(err, LedgerError::Protocol(_)));
    }

    #[test]
    fn test_error_message_from_envelope() {
        let body = r#"{"error":{"code":"","message":{"lang":"","value":"X"}}}"#;
        assert_eq!(extract_error_message(body), "X");
    }

    #[test]
    fn test_error_message_from_token_endpoint() {
        assert_eq!(
            extract_error_message(r#"{"error":"invalid_grant","error_description":"Expired"}"#),
            "Expired"
        );
        assert_eq!(extract_error_message(r#"{"error":"invalid_grant"}"#), "invalid_grant");
    }

    /// Validates `extract_error_message` behavior for the empty candidate
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms an empty envelope message falls through to the description.
    #[test]
    fn test_error_message_skips_empty_candidates() {
        let body = r#"{"error":{"message":{"value":""}},"error_description":"Locked"}"#;
        assert_eq!(extract_error_message(body), "Locked");
    }

    #[test]
    fn test_error_message_falls_back_to_raw_body() {
        assert_eq!(extract_error_message(" Service Unavailable \n"), "Service Unavailable");
        assert_eq!(extract_error_message(r#"{"unexpected":true}"#), r#"{"unexpected":true}"#);
    }
}
