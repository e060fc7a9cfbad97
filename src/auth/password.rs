use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 72;

pub fn validate_password_length(password: &str) -> Result<(), AppError> {
    let len = password.as_bytes().len();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(AppError::BadRequest(
            "password must be between 8 and 72 bytes".to_string(),
        ));
    }
    Ok(())
}

pub fn hash(password: &str) -> Result<String, AppError> {
    validate_password_length(password)?;
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(e.into()))
}

pub fn verify(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_and_long_passwords() {
        assert!(validate_password_length("short7!").is_err());
        assert!(validate_password_length("exactly8").is_ok());
        assert!(validate_password_length(&"a".repeat(72)).is_ok());
        assert!(validate_password_length(&"a".repeat(73)).is_err());
    }

    #[test]
    fn hash_then_verify_roundtrips() {
        let hashed = hash("correct horse battery").unwrap();
        assert!(verify("correct horse battery", &hashed));
        assert!(!verify("wrong password", &hashed));
    }
}
