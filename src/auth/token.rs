use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{OrganizationId, Role, User, UserId};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Signed claims carried by a credential. The organization and role are a
/// snapshot taken at issue time and must be re-checked against the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub role: Role,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// HS256 issuer and verifier sharing one secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &str, issuer: impl Into<String>, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        self.issue_with_ttl(user, self.ttl)
    }

    /// Issue with an explicit lifetime. A negative `ttl` yields a token that
    /// is already expired.
    pub fn issue_with_ttl(&self, user: &User, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            user_id: user.id,
            organization_id: user.organization_id,
            role: user.role,
            username: user.username.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.issuer.clone(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|error| TokenError::Signing(error.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(
            |error| match error.kind() {
                JwtErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(error.to_string()),
            },
        )?;

        if data.claims.sub != data.claims.user_id.to_string() {
            return Err(TokenError::Invalid("subject does not match user_id".to_string()));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: UserId(7),
            username: "ff_operator".to_string(),
            role: Role::Ff,
            organization_id: OrganizationId(3),
        }
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", "shiptrack", Duration::minutes(30))
    }

    #[test]
    fn test_issue_then_decode_preserves_claims() {
        let issuer = issuer();
        let token = issuer.issue(&user()).unwrap();
        let claims = issuer.decode(&token).unwrap();
        assert_eq!(claims.user_id, UserId(7));
        assert_eq!(claims.organization_id, OrganizationId(3));
        assert_eq!(claims.role, Role::Ff);
        assert_eq!(claims.iss, "shiptrack");
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let issuer = issuer();
        let token = issuer.issue_with_ttl(&user(), Duration::hours(-2)).unwrap();
        assert!(matches!(issuer.decode(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_foreign_secret_and_issuer_are_rejected() {
        let token = TokenIssuer::new("other-secret", "shiptrack", Duration::minutes(5))
            .issue(&user())
            .unwrap();
        assert!(matches!(issuer().decode(&token), Err(TokenError::Invalid(_))));

        let token = TokenIssuer::new("test-secret", "someone-else", Duration::minutes(5))
            .issue(&user())
            .unwrap();
        assert!(matches!(issuer().decode(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert!(matches!(issuer().decode("not.a.jwt"), Err(TokenError::Invalid(_))));
    }
}
