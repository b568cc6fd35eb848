//! Caller identity from the upgrade handshake.

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use courier_core::RecipientId;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use thiserror::Error;

/// Why a handshake carried no usable identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No `Authorization` header.
    #[error("missing authorization header")]
    MissingHeader,
    /// Header present but not `Bearer <token>`.
    #[error("malformed authorization header")]
    MalformedHeader,
    /// Signature, expiry, issuer or audience check failed.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    /// Token valid but carries no subject.
    #[error("token has no subject")]
    MissingSubject,
}

/// Resolves the authenticated recipient from request headers.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Authenticated recipient for this request.
    async fn resolve(&self, headers: &HeaderMap) -> Result<RecipientId, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
}

/// HS256 bearer-token resolver.
pub struct JwtIdentityResolver {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    /// Verify tokens signed with `secret`, optionally requiring `iss`/`aud`.
    pub fn new(secret: &str, issuer: Option<&str>, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify a raw token and return its subject.
    pub fn verify(&self, token: &str) -> Result<RecipientId, IdentityError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        data.claims
            .sub
            .filter(|s| !s.is_empty())
            .map(RecipientId::from_string)
            .ok_or(IdentityError::MissingSubject)
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<RecipientId, IdentityError> {
        let value = headers.get(AUTHORIZATION).ok_or(IdentityError::MissingHeader)?;
        let value = value.to_str().map_err(|_| IdentityError::MalformedHeader)?;
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(IdentityError::MalformedHeader)?;
        self.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn token(claims: &serde_json::Value, secret: &str) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn resolves_subject() {
        let resolver = JwtIdentityResolver::new(SECRET, None, None);
        let t = token(&json!({"sub": "u1", "exp": exp()}), SECRET);
        assert_eq!(resolver.resolve(&bearer(&t)).await.unwrap().as_str(), "u1");
    }

    #[tokio::test]
    async fn missing_and_malformed_headers() {
        let resolver = JwtIdentityResolver::new(SECRET, None, None);
        assert_matches!(
            resolver.resolve(&HeaderMap::new()).await,
            Err(IdentityError::MissingHeader)
        );

        let mut headers = HeaderMap::new();
        let _ = headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_matches!(resolver.resolve(&headers).await, Err(IdentityError::MalformedHeader));
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let resolver = JwtIdentityResolver::new(SECRET, None, None);
        let t = token(&json!({"sub": "u1", "exp": exp()}), "other");
        assert_matches!(resolver.resolve(&bearer(&t)).await, Err(IdentityError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let resolver = JwtIdentityResolver::new(SECRET, None, None);
        let t = token(&json!({"sub": "u1", "exp": chrono::Utc::now().timestamp() - 3600}), SECRET);
        assert_matches!(resolver.resolve(&bearer(&t)).await, Err(IdentityError::InvalidToken(_)));
    }

    #[test]
    fn missing_subject_rejected() {
        let resolver = JwtIdentityResolver::new(SECRET, None, None);
        let t = token(&json!({"exp": exp()}), SECRET);
        assert_matches!(resolver.verify(&t), Err(IdentityError::MissingSubject));
    }

    #[test]
    fn issuer_and_audience_enforced() {
        let resolver = JwtIdentityResolver::new(SECRET, Some("courier"), Some("clients"));
        let good = token(
            &json!({"sub": "u1", "exp": exp(), "iss": "courier", "aud": "clients"}),
            SECRET,
        );
        assert!(resolver.verify(&good).is_ok());

        let wrong_iss = token(
            &json!({"sub": "u1", "exp": exp(), "iss": "elsewhere", "aud": "clients"}),
            SECRET,
        );
        assert_matches!(resolver.verify(&wrong_iss), Err(IdentityError::InvalidToken(_)));
    }
}
