//! HS256 bearer tokens: issuing and validation.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use thiserror::Error;

use crate::{JwtClaims, RoleName, TokenValidationError, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("failed to encode token: {0}")]
    Encoding(String),
}

impl From<TokenValidationError> for TokenError {
    fn from(value: TokenValidationError) -> Self {
        match value {
            TokenValidationError::Expired => TokenError::Expired,
            other => TokenError::Invalid(other.to_string()),
        }
    }
}

/// Mints signed bearer tokens.
pub trait TokenIssuer: Send + Sync {
    fn issue(
        &self,
        subject: &str,
        full_name: &str,
        authorities: &[RoleName],
        now: DateTime<Utc>,
    ) -> Result<String, TokenError>;
}

/// Verifies signature and time window of a presented bearer token.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError>;
}

/// Symmetric HMAC-SHA256 issuer/validator over a shared secret.
#[derive(Clone)]
pub struct Hs256Jwt {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Hs256Jwt {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }
}

impl core::fmt::Debug for Hs256Jwt {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256Jwt").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TokenIssuer for Hs256Jwt {
    fn issue(
        &self,
        subject: &str,
        full_name: &str,
        authorities: &[RoleName],
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = JwtClaims {
            sub: subject.to_string(),
            full_name: full_name.to_string(),
            authorities: authorities.iter().map(|r| r.as_str().to_string()).collect(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }
}

impl JwtValidator for Hs256Jwt {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt() -> Hs256Jwt {
        Hs256Jwt::new(b"test-secret", Duration::minutes(10))
    }

    #[test]
    fn issue_and_validate() {
        let now = Utc::now();
        let token = jwt()
            .issue("jane@x.com", "Jane Doe", &[RoleName::USER], now)
            .unwrap();
        assert!(!token.is_empty());

        let claims = jwt().validate(&token, now).unwrap();
        assert_eq!(claims.sub, "jane@x.com");
        assert_eq!(claims.full_name, "Jane Doe");
        assert_eq!(claims.authorities, vec!["USER".to_string()]);
        assert_eq!(claims.exp - claims.iat, 600);
    }

    #[test]
    fn expired_token_is_rejected() {
        let issued = Utc::now() - Duration::hours(1);
        let token = jwt().issue("jane@x.com", "Jane Doe", &[], issued).unwrap();

        assert_eq!(jwt().validate(&token, Utc::now()), Err(TokenError::Expired));
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let now = Utc::now();
        let other = Hs256Jwt::new(b"another-secret", Duration::minutes(10));
        let token = other.issue("jane@x.com", "Jane Doe", &[], now).unwrap();

        assert!(matches!(jwt().validate(&token, now), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            jwt().validate("not.a.jwt", Utc::now()),
            Err(TokenError::Invalid(_))
        ));
    }
}
