use crate::error::AppError;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_role: Option<String>,
}

pub fn issue_access_token(
    secret: &str,
    user_id: Uuid,
    org: Option<(Uuid, String)>,
) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp(),
        exp: (now + Duration::minutes(ACCESS_TOKEN_TTL_MINUTES)).timestamp(),
        org_id: org.as_ref().map(|(id, _)| *id),
        org_role: org.map(|(_, role)| role),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.into()))
}

pub fn validate_access_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthenticated)?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_and_validates_round_trip() {
        let secret = "test-secret";
        let user_id = Uuid::new_v4();
        let token = issue_access_token(secret, user_id, None).unwrap();
        let claims = validate_access_token(secret, &token).unwrap();
        assert_eq!(claims.sub, user_id);
    }

    #[test]
    fn rejects_token_signed_with_different_secret() {
        let token = issue_access_token("secret-a", Uuid::new_v4(), None).unwrap();
        assert!(validate_access_token("secret-b", &token).is_err());
    }
}
