//! Bearer token verification.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use crate::{JwtClaims, TokenValidationError, validate_claims};

/// Verifies a raw bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// HMAC-SHA256 validator with a shared secret.
///
/// Expiry is checked against our own `issued_at`/`expires_at` claims rather
/// than the registered `exp` claim.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;

        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl core::fmt::Debug for Hs256JwtValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256JwtValidator").finish_non_exhaustive()
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenValidationError::InvalidSignature,
                _ => TokenValidationError::Malformed(e.to_string()),
            }
        })?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use labstock_core::UserId;

    use super::*;
    use crate::Role;

    fn mint(secret: &str, claims: &JwtClaims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn fresh_claims() -> JwtClaims {
        let now = Utc::now();
        JwtClaims {
            sub: UserId::new(),
            roles: vec![Role::ADMIN],
            issued_at: now - Duration::seconds(5),
            expires_at: now + Duration::hours(1),
        }
    }

    #[test]
    fn decodes_token_signed_with_same_secret() {
        let claims = fresh_claims();
        let token = mint("s3cret", &claims);

        let validator = Hs256JwtValidator::new("s3cret");
        let decoded = validator.validate(&token, Utc::now()).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let token = mint("other", &fresh_claims());

        let validator = Hs256JwtValidator::new("s3cret");
        assert_eq!(
            validator.validate(&token, Utc::now()),
            Err(TokenValidationError::InvalidSignature)
        );
    }

    #[test]
    fn rejects_garbage_and_expired_tokens() {
        let validator = Hs256JwtValidator::new("s3cret");
        assert!(matches!(
            validator.validate("not.a.jwt", Utc::now()),
            Err(TokenValidationError::Malformed(_))
        ));

        let token = mint("s3cret", &fresh_claims());
        let later = Utc::now() + Duration::hours(2);
        assert_eq!(validator.validate(&token, later), Err(TokenValidationError::Expired));
    }
}
