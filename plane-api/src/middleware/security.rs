/// Response hardening headers
///
/// The API serves JSON and file downloads only, so framing and content
/// sniffing are refused outright. `Strict-Transport-Security` is added only
/// when the server runs in production behind TLS.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

const HSTS: &str = "max-age=31536000; includeSubDomains";

#[derive(Debug, Clone, Copy)]
pub struct HeaderPolicy {
    pub hsts: bool,
}

fn apply(policy: HeaderPolicy, headers: &mut HeaderMap) {
    let fixed = [
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_FRAME_OPTIONS, "DENY"),
        (header::REFERRER_POLICY, "same-origin"),
        (
            HeaderName::from_static("cross-origin-opener-policy"),
            "same-origin",
        ),
        (
            header::CONTENT_SECURITY_POLICY,
            "default-src 'none'; frame-ancestors 'none'",
        ),
    ];
    for (name, value) in fixed {
        headers.insert(name, HeaderValue::from_static(value));
    }

    if policy.hsts {
        headers.insert(header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS));
    }
}

/// Use with `axum::middleware::from_fn_with_state(HeaderPolicy { .. }, security_headers)`
pub async fn security_headers(
    State(policy): State<HeaderPolicy>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    apply(policy, response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_without_hsts() {
        let mut headers = HeaderMap::new();
        apply(HeaderPolicy { hsts: false }, &mut headers);

        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers["cross-origin-opener-policy"], "same-origin");
        assert!(headers.contains_key(header::CONTENT_SECURITY_POLICY));
        assert!(!headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
    }

    #[test]
    fn test_hsts_in_production() {
        let mut headers = HeaderMap::new();
        apply(HeaderPolicy { hsts: true }, &mut headers);
        assert_eq!(headers[header::STRICT_TRANSPORT_SECURITY], HSTS);
    }

    #[test]
    fn test_overrides_handler_values() {
        let mut headers = HeaderMap::new();
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
        apply(HeaderPolicy { hsts: false }, &mut headers);
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    }
}
