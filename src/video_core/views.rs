//! View recording and the password-gate cookie for protected watch pages.

use crate::state::AppState;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use uuid::Uuid;

pub const WATCH_COOKIE_PREFIX: &str = "sr_watch_";
pub const WATCH_COOKIE_TTL_SECS: i64 = 60 * 60;

/// `hex(sha256(clientIP + "|" + userAgent))[:16]` — lossy on purpose, no PII
/// retained.
pub fn viewer_hash(headers: &HeaderMap, peer: SocketAddr) -> String {
    let ip = crate::rate_limiter::client_ip_key(headers, peer);
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    let digest = Sha256::digest(format!("{ip}|{user_agent}").as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Recorded off the response-blocking path; expired links must never reach
/// this function (the caller checks expiry first).
pub fn record_view(state: &AppState, video_id: Uuid, viewer_hash: String) {
    let db = state.db.clone();
    tokio::spawn(async move {
        if let Err(err) = sqlx::query(
            "INSERT INTO views (video_id, viewer_hash) VALUES ($1, $2)",
        )
        .bind(video_id)
        .bind(&viewer_hash)
        .execute(&db)
        .await
        {
            tracing::warn!(?err, %video_id, "failed to record view");
        }
    });
}

type HmacSha256 = Hmac<Sha256>;

pub fn sign_watch_cookie(secret: &str, share_token: &str, expires_at_unix: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(format!("{share_token}:{expires_at_unix}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_watch_cookie(
    secret: &str,
    share_token: &str,
    expires_at_unix: i64,
    signature: &str,
) -> bool {
    if expires_at_unix < chrono::Utc::now().timestamp() {
        return false;
    }
    let expected = sign_watch_cookie(secret, share_token, expires_at_unix);
    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_hash_matches_spec_example() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::USER_AGENT, "X/1.0".parse().unwrap());
        let peer: SocketAddr = "10.0.0.1:1234".parse().unwrap();
        let hash = viewer_hash(&headers, peer);
        let expected = hex::encode(Sha256::digest(b"10.0.0.1|X/1.0"))[..16].to_string();
        assert_eq!(hash, expected);
    }

    #[test]
    fn watch_cookie_signature_round_trips() {
        let secret = "super-secret";
        let expires = chrono::Utc::now().timestamp() + 3600;
        let sig = sign_watch_cookie(secret, "abc123", expires);
        assert!(verify_watch_cookie(secret, "abc123", expires, &sig));
        assert!(!verify_watch_cookie(secret, "abc123", expires, "deadbeef"));
    }

    #[test]
    fn watch_cookie_rejects_expired_signature() {
        let secret = "super-secret";
        let expires = chrono::Utc::now().timestamp() - 10;
        let sig = sign_watch_cookie(secret, "abc123", expires);
        assert!(!verify_watch_cookie(secret, "abc123", expires, &sig));
    }
}
