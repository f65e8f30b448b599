//! Redaction of secrets in request logs

use reqwest::header::{HeaderMap, AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION};

/// Replacement text for secret values
pub const REDACTED: &str = "[REDACTED]";

/// Renders headers as `name: value` pairs with secrets replaced by [`REDACTED`]
///
/// A value is secret when it was marked sensitive or its header name is one
/// of the credential-carrying headers.
pub fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let secret = value.is_sensitive()
                || name == AUTHORIZATION
                || name == PROXY_AUTHORIZATION
                || name == COOKIE
                || name.as_str().starts_with("x-auth");
            let shown = if secret {
                REDACTED.to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str().to_string(), shown)
        })
        .collect()
}

/// Strips the query string, which may carry signatures or tokens
pub fn redact_url(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
