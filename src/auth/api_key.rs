use crate::auth::tokens::hash_token;
use rand::RngCore;

pub const KEY_PREFIX: &str = "sr_";

/// `sr_<48-hex-char-random>`. Returns the raw key (shown once to the caller)
/// and its SHA-256 hash (what actually gets stored).
pub fn generate() -> (String, String) {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    let raw = format!("{KEY_PREFIX}{}", hex::encode(bytes));
    let hash = hash_token(&raw);
    (raw, hash)
}

pub fn looks_like_api_key(bearer_value: &str) -> bool {
    bearer_value.starts_with(KEY_PREFIX) && bearer_value.len() == KEY_PREFIX.len() + 48
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_matches_its_own_shape_check() {
        let (raw, hash) = generate();
        assert!(looks_like_api_key(&raw));
        assert_eq!(hash, hash_token(&raw));
    }

    #[test]
    fn rejects_jwt_shaped_values() {
        assert!(!looks_like_api_key("eyJhbGciOiJIUzI1NiJ9.x.y"));
    }
}
