//! CSP-nonce injection and the fixed set of security headers stamped on
//! every response.

use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use base64::Engine;
use rand::RngCore;

#[derive(Debug, Clone, Copy)]
pub struct CspNonce(pub [u8; 16]);

impl CspNonce {
    fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }
}

pub async fn security_headers(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let nonce = CspNonce::generate();
    let nonce_b64 = nonce.as_base64();
    req.extensions_mut().insert(nonce);

    let is_embed = req.uri().path().starts_with("/embed/");
    let mut resp = next.run(req).await;

    let storage_host = &state.config.s3.public_endpoint;
    let frame_ancestors = if is_embed {
        "*".to_string()
    } else {
        state.config.allowed_frame_ancestors.clone()
    };
    let csp = format!(
        "default-src 'self'; script-src 'self' 'nonce-{nonce_b64}'; \
         style-src 'self' 'nonce-{nonce_b64}'; img-src 'self' data: {storage_host}; \
         media-src 'self' data: {storage_host}; connect-src 'self' {storage_host}; \
         frame-ancestors {frame_ancestors};"
    );

    let headers = resp.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&csp) {
        headers.insert("content-security-policy", v);
    }
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("SAMEORIGIN"));
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("camera=(self), microphone=(self), display-capture=(self)"),
    );
    if state.config.is_https() {
        headers.insert(
            "strict-transport-security",
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }

    resp
}
