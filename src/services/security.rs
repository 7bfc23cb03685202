use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::CONFIG;
use crate::error::Result;

// Access tokens expire a fixed window after issuance; there is no sliding
// renewal, an expired token always forces a fresh login.
const ACCESS_TOKEN_EXPIRE: i64 = 3600 * 24; // 24 hours

/// JWT token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user id)
    pub email: String,
    pub role: String,
    pub exp: i64, // Expiration time
    pub iat: i64, // Issued at
}

/// Hash a password using bcrypt
pub fn hash_password(password: &str) -> Result<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

/// Verify a password against its hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Create a JWT access token for a user
pub fn create_access_token(
    user_id: i64,
    email: &str,
    role: &str,
    expires_in: Option<i64>,
) -> Result<String> {
    let now = Utc::now();
    let exp = now + Duration::seconds(expires_in.unwrap_or(ACCESS_TOKEN_EXPIRE));

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        role: role.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    let encoding_key = EncodingKey::from_secret(CONFIG.jwt_secret.as_bytes());
    Ok(encode(&Header::default(), &claims, &encoding_key)?)
}

/// Decode and validate a JWT token
pub fn decode_token(token: &str) -> Result<Claims> {
    let decoding_key = DecodingKey::from_secret(CONFIG.jwt_secret.as_bytes());

    let mut validation = Validation::default();
    validation.validate_exp = true;
    // No clock skew tolerance for expiration check
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &decoding_key, &validation)?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Password Hashing Tests
    // ==========================================================================

    #[test]
    fn test_password_hashing() {
        let password = "test_password123";
        let hash = hash_password(password).unwrap();
        assert!(verify_password(password, &hash));
        assert!(!verify_password("wrong_password", &hash));
    }

    #[test]
    fn test_password_hashing_unicode() {
        let password = "пароль密码🔐";
        let hash = hash_password(password).unwrap();
        assert!(verify_password(password, &hash));
    }

    #[test]
    fn test_verify_password_invalid_hash() {
        // Invalid bcrypt hash should return false, not panic
        assert!(!verify_password("test", "not_a_valid_hash"));
    }

    // ==========================================================================
    // JWT Token Tests
    // ==========================================================================

    #[test]
    fn test_create_and_decode_access_token() {
        let token = create_access_token(42, "user@example.com", "admin", Some(3600))
            .expect("Failed to create access token");

        let claims = decode_token(&token).expect("Failed to decode access token");

        assert_eq!(claims.sub, "42");
        assert_eq!(claims.email, "user@example.com");
        assert_eq!(claims.role, "admin");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_token_expiration() {
        // Create a token that expired in the past
        let token = create_access_token(1, "user@example.com", "user", Some(-10))
            .expect("Failed to create expired token");

        let result = decode_token(&token);
        assert!(
            result.is_err(),
            "Expected token to be expired but decode succeeded"
        );
    }

    #[test]
    fn test_decode_invalid_token() {
        assert!(decode_token("not.a.valid.token").is_err());
        assert!(decode_token("completely_invalid").is_err());
    }
}
