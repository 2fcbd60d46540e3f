//! Handshake helpers for the WebSocket transport
//!
//! Handles request URI parsing and origin validation.

use std::path::PathBuf;

use url::Url;

/// Allowed origins for WebSocket connections
/// Only localhost is allowed by default for security
pub const ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost",
    "http://127.0.0.1",
    "https://localhost",
    "https://127.0.0.1",
];

/// Webview pages get a random host per instance, so only the scheme is checked
pub const WEBVIEW_SCHEME: &str = "vscode-webview";

/// Percent-decoded value of `key` in the request URI's query string
pub fn query_param(uri: &str, key: &str) -> Option<String> {
    let (_, query) = uri.split_once('?')?;
    query
        .split('&')
        .filter_map(|param| param.split_once('='))
        .find(|(k, v)| *k == key && !v.is_empty())
        .and_then(|(_, v)| {
            percent_encoding::percent_decode_str(v)
                .decode_utf8()
                .ok()
                .map(std::borrow::Cow::into_owned)
        })
}

/// Document path requested by the view
/// Format: /?doc=<url_encoded_path>
pub fn parse_document_from_uri(uri: &str) -> Option<PathBuf> {
    query_param(uri, "doc").map(PathBuf::from)
}

/// Validate origin header against whitelist using strict URL parsing
///
/// Scheme and host are compared exactly, so `http://localhost.evil.com` does
/// not pass as localhost.
pub fn validate_origin(origin: &str) -> bool {
    let Ok(origin_url) = Url::parse(origin) else {
        return false;
    };

    let origin_host = origin_url.host_str().unwrap_or("");
    let origin_scheme = origin_url.scheme();
    if origin_scheme == WEBVIEW_SCHEME {
        return !origin_host.is_empty();
    }

    ALLOWED_ORIGINS.iter().any(|allowed| {
        let Ok(allowed_url) = Url::parse(allowed) else {
            return false;
        };
        origin_scheme == allowed_url.scheme() && Some(origin_host) == allowed_url.host_str()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        assert_eq!(
            parse_document_from_uri("/?doc=%2Fhome%2Fme%2Fnotes%20today.md"),
            Some(PathBuf::from("/home/me/notes today.md"))
        );
        assert_eq!(
            parse_document_from_uri("/?theme=dark&doc=readme.md"),
            Some(PathBuf::from("readme.md"))
        );
        assert_eq!(parse_document_from_uri("/?doc="), None);
        assert_eq!(parse_document_from_uri("/"), None);
    }

    #[test]
    fn test_query_param_rejects_bad_utf8() {
        assert_eq!(query_param("/?doc=%FF", "doc"), None);
    }

    #[test]
    fn test_validate_origin_valid() {
        assert!(validate_origin("http://localhost"));
        assert!(validate_origin("http://localhost:8080"));
        assert!(validate_origin("http://127.0.0.1:3000"));
        assert!(validate_origin("https://localhost:443"));
        assert!(validate_origin("vscode-webview://1f0c3b9e2d"));
    }

    #[test]
    fn test_validate_origin_bypass_attempts() {
        // Bypass attempts that MUST be rejected
        assert!(!validate_origin("http://localhost.evil.com"));
        assert!(!validate_origin("http://localhost.evil.com:8080"));
        assert!(!validate_origin("http://evil.localhost.com"));
        assert!(!validate_origin("http://localhostevil.com"));
        assert!(!validate_origin("http://127.0.0.1.evil.com"));
        assert!(!validate_origin("vscode-webview:"));
    }

    #[test]
    fn test_validate_origin_invalid() {
        assert!(!validate_origin("http://evil.com"));
        assert!(!validate_origin("http://192.168.1.1"));
        assert!(!validate_origin("not-a-url"));
        assert!(!validate_origin(""));
    }
}
