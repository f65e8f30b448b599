//! Provider error payload translation
//!
//! Backends describe failures in different shapes. [`translate_error`]
//! reduces the ones seen in practice to a single [`RemoteFault`]:
//!
//! - flat JSON: `{"status": 401, "code": "expired_auth_token", "message": "..."}`
//! - nested JSON: `{"error": {"code": "InvalidAuthenticationToken", "message": "..."}}`
//! - XML: `<Error><Code>NoSuchKey</Code><Message>...</Message></Error>`
//!
//! Anything else keeps the HTTP status, no code, and the (truncated) body
//! text as the message.

use polysync_core::domain::{RemoteFault, SyncFault};
use reqwest::Response;
use serde::Deserialize;

/// Longest body excerpt kept as a fallback message
const MAX_MESSAGE_LEN: usize = 512;

#[derive(Debug, Deserialize)]
struct FlatPayload {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedPayload {
    error: FlatPayload,
}

/// Translates a failed response body into a [`RemoteFault`]
pub fn translate_error(status: u16, body: &[u8]) -> RemoteFault {
    if let Ok(nested) = serde_json::from_slice::<NestedPayload>(body) {
        return from_payload(status, nested.error);
    }
    if let Ok(flat) = serde_json::from_slice::<FlatPayload>(body) {
        if flat.code.is_some() || flat.message.is_some() {
            return from_payload(status, flat);
        }
    }

    let text = String::from_utf8_lossy(body);
    if let Some(code) = xml_element(&text, "Code") {
        let message = xml_element(&text, "Message").unwrap_or_default();
        return RemoteFault::new(status, Some(code), message);
    }

    RemoteFault::new(status, None, fallback_message(status, text.trim()))
}

/// Reads the body of a failed response and translates it
pub async fn fault_from_response(response: Response) -> RemoteFault {
    let status = response.status().as_u16();
    let body = response.bytes().await.unwrap_or_default();
    translate_error(status, &body)
}

/// Maps a transport-level failure, dropping the URL from the message
pub fn transport_fault(error: reqwest::Error) -> SyncFault {
    if error.is_decode() {
        return SyncFault::Transport(format!("malformed response body: {}", error.without_url()));
    }
    SyncFault::Transport(error.without_url().to_string())
}

fn from_payload(status: u16, payload: FlatPayload) -> RemoteFault {
    let code = payload.code.filter(|code| !code.is_empty());
    let message = payload
        .message
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| fallback_message(status, ""));
    RemoteFault::new(status, code, message)
}

fn fallback_message(status: u16, text: &str) -> String {
    if text.is_empty() {
        return reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("request failed")
            .to_string();
    }
    let mut end = text.len().min(MAX_MESSAGE_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

fn xml_element(text: &str, name: &str) -> Option<String> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = text.find(&open)? + open.len();
    let len = text[start..].find(&close)?;
    Some(text[start..start + len].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_json_payload() {
        let body = br#"{"status": 401, "code": "expired_auth_token", "message": "Authorization token has expired"}"#;
        let fault = translate_error(401, body);
        assert_eq!(fault.status, 401);
        assert_eq!(fault.code.as_deref(), Some("expired_auth_token"));
        assert_eq!(fault.message, "Authorization token has expired");
    }

    #[test]
    fn test_nested_json_payload() {
        let body = br#"{"error": {"code": "InvalidAuthenticationToken", "message": "Access token has expired."}}"#;
        let fault = translate_error(401, body);
        assert_eq!(fault.code.as_deref(), Some("InvalidAuthenticationToken"));
        assert_eq!(fault.message, "Access token has expired.");
    }

    #[test]
    fn test_xml_payload() {
        let body = b"<?xml version=\"1.0\"?><Error><Code>NoSuchKey</Code><Message>The key does not exist</Message></Error>";
        let fault = translate_error(404, body);
        assert_eq!(fault.code.as_deref(), Some("NoSuchKey"));
        assert_eq!(fault.message, "The key does not exist");
    }

    #[test]
    fn test_plain_text_body_is_message() {
        let fault = translate_error(502, b"  upstream unavailable\n");
        assert_eq!(fault.code, None);
        assert_eq!(fault.message, "upstream unavailable");
    }

    #[test]
    fn test_empty_body_uses_reason_phrase() {
        let fault = translate_error(404, b"");
        assert_eq!(fault.message, "Not Found");
    }

    #[test]
    fn test_json_without_known_fields_falls_back() {
        let fault = translate_error(500, br#"{"unexpected": true}"#);
        assert_eq!(fault.code, None);
        assert_eq!(fault.message, r#"{"unexpected": true}"#);
    }

    #[test]
    fn test_long_body_truncated_on_char_boundary() {
        let body = "é".repeat(400);
        let fault = translate_error(500, body.as_bytes());
        assert!(fault.message.len() <= MAX_MESSAGE_LEN);
        assert!(fault.message.chars().all(|c| c == 'é'));
    }
}
