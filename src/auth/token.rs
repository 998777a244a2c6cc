use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{app_error::AppError, auth::Role};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and validates the HS256 bearer tokens used by every protected
/// route. Stateless: the only server-side secret is the signing key, so a
/// token stays valid until its expiry regardless of logouts.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact; a token that is one second past `exp` is rejected.
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user_id: Uuid, role: Role) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| AppError::Other(err.into()))
    }

    /// Any failure, whether a bad signature, a malformed token or a past
    /// expiry, collapses to `InvalidToken`; callers never learn which.
    pub fn validate(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("unit-test-secret", 24)
    }

    #[test]
    fn issued_token_round_trips_subject_and_role() {
        let tokens = service();
        let user_id = Uuid::new_v4();

        let token = tokens.issue(user_id, Role::Seller).unwrap();
        let claims = tokens.validate(&token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::Seller);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let tokens = service();
        let token = tokens.issue(Uuid::new_v4(), Role::Buyer).unwrap();

        // Flip a character in the signature segment.
        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'a' { 'b' } else { 'a' });

        assert!(matches!(
            tokens.validate(&tampered),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = TokenService::new("other-secret", 24)
            .issue(Uuid::new_v4(), Role::Admin)
            .unwrap();
        assert!(matches!(
            service().validate(&token),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let expired = TokenService::new("unit-test-secret", -1)
            .issue(Uuid::new_v4(), Role::Buyer)
            .unwrap();
        assert!(matches!(
            service().validate(&expired),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            service().validate("not-a-token"),
            Err(AppError::InvalidToken)
        ));
    }
}
