//! HS256 session tokens. The `jti` claim is the session row id, so a token
//! stops working as soon as its session is revoked.

use chrono::{DateTime, Duration, Utc};
use genstudio_core::AppError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiry: Duration,
}

impl JwtService {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub", "jti"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            expiry: Duration::hours(expiry_hours.max(1)),
        }
    }

    /// Sign a token for a new session.
    pub fn issue(&self, user_id: Uuid) -> Result<IssuedToken, AppError> {
        let now = Utc::now();
        let expires_at = now + self.expiry;
        let session_id = Uuid::new_v4();
        let claims = SessionClaims {
            sub: user_id,
            jti: session_id,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))?;

        Ok(IssuedToken {
            token,
            session_id,
            expires_at,
        })
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AppError> {
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                AppError::Unauthorized("Invalid or expired token".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    #[test]
    fn test_issue_and_verify() {
        let service = JwtService::new(SECRET, 24);
        let user_id = Uuid::new_v4();
        let issued = service.issue(user_id).unwrap();

        let claims = service.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.jti, issued.session_id);
        assert_eq!(claims.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn test_rejects_other_secret() {
        let issued = JwtService::new(SECRET, 24).issue(Uuid::new_v4()).unwrap();
        let other = JwtService::new("another-secret-that-is-also-32-characters", 24);
        assert!(matches!(
            other.verify(&issued.token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        let service = JwtService::new(SECRET, 24);
        assert!(service.verify("not.a.token").is_err());
    }
}
