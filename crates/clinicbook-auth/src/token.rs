//! Token Service
//!
//! Issues and verifies expiring claim tokens:
//! - Access tokens (short-lived) carried in the tab-scoped session
//! - Refresh tokens (long-lived) persisted across reloads
//!
//! Tokens are three dot-separated base64url segments (header, claims,
//! HMAC-SHA256 tag). Expiry is judged against the injected [`Clock`], so
//! verification stays deterministic under simulated time.

use chrono::Duration;
use clinicbook_types::{Clock, SessionId, UserIdentity};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{to_chrono, TokenConfig};
use crate::error::{AuthError, AuthResult};
use crate::types::{IssuedToken, TokenClaims, TokenPair, TokenType};

/// Token service for issuing and verifying tokens
#[derive(Clone)]
pub struct TokenService {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Create a new token service
    pub fn new(config: TokenConfig, clock: Arc<dyn Clock>) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
            clock,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issue a single token of the given type
    pub fn issue(
        &self,
        user: &UserIdentity,
        session_id: Option<&SessionId>,
        token_type: TokenType,
    ) -> AuthResult<IssuedToken> {
        let lifetime = match token_type {
            TokenType::Access => self.config.access_token_lifetime,
            TokenType::Refresh => self.config.refresh_token_lifetime,
        };
        let now = self.clock.now();
        let exp = now + to_chrono(lifetime)?;

        let claims = TokenClaims {
            sub: user.id.as_uuid().to_string(),
            token_type,
            email: user.email.clone(),
            role: user.role,
            name: user.name.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            jti: Uuid::new_v4().to_string(),
            sid: session_id.map(|s| s.as_uuid().to_string()),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to encode {} token: {}", token_type, e)))?;

        Ok(IssuedToken { token, claims })
    }

    /// Issue an access + refresh pair for one session
    pub fn issue_pair(&self, user: &UserIdentity, session_id: &SessionId) -> AuthResult<TokenPair> {
        let access = self.issue(user, Some(session_id), TokenType::Access)?;
        let refresh = self.issue(user, Some(session_id), TokenType::Refresh)?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            access_expires_at: access.claims.exp,
            refresh_expires_at: refresh.claims.exp,
            refresh_jti: refresh.claims.jti,
        })
    }

    /// Verify integrity tag, issuer, audience and expiry
    pub fn verify(&self, token: &str) -> AuthResult<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        // Expiry is checked below against the injected clock
        validation.validate_exp = false;
        validation.validate_nbf = false;

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)?.claims;

        if self.clock.now().timestamp() > claims.exp {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }

    /// Verify a token and require a specific type
    pub fn verify_kind(&self, token: &str, token_type: TokenType) -> AuthResult<TokenClaims> {
        let claims = self.verify(token)?;
        if claims.token_type != token_type {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Decode claims without checking the tag or expiry
    ///
    /// Only for read-only inspection (time remaining, display). Never trust
    /// the result for authorization.
    pub fn decode(&self, token: &str) -> AuthResult<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims::<&str>(&[]);

        Ok(decode::<TokenClaims>(token, &self.decoding_key, &validation)?.claims)
    }

    /// Whether the token is past its expiry (undecodable tokens count as expired)
    pub fn is_expired(&self, token: &str) -> bool {
        self.decode(token)
            .map(|claims| self.clock.now().timestamp() > claims.exp)
            .unwrap_or(true)
    }

    /// Time until expiry, zero when expired or undecodable
    pub fn time_remaining(&self, token: &str) -> std::time::Duration {
        self.decode(token)
            .ok()
            .and_then(|claims| {
                let remaining = Duration::seconds(claims.exp - self.clock.now().timestamp());
                remaining.to_std().ok()
            })
            .unwrap_or(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinicbook_types::{ManualClock, UserId, UserRole};

    fn test_config() -> TokenConfig {
        TokenConfig {
            secret: "test-secret-key-for-jwt-tokens-min-32-bytes!".to_string(),
            ..TokenConfig::default()
        }
    }

    fn service() -> (TokenService, ManualClock) {
        let clock = ManualClock::starting_now();
        (TokenService::new(test_config(), Arc::new(clock.clone())), clock)
    }

    fn user() -> UserIdentity {
        UserIdentity::new(UserId::new(), "admin@clinic.example", UserRole::Admin, "Clinic Admin")
    }

    #[test]
    fn test_round_trip_before_expiry() {
        let (service, _) = service();
        let users = [
            user(),
            UserIdentity::new(UserId::new(), "staff@clinic.example", UserRole::Staff, "Zoë Ñúñez"),
            UserIdentity::new(UserId::new(), "p@x.com", UserRole::Patient, ""),
        ];

        for user in users {
            for kind in [TokenType::Access, TokenType::Refresh] {
                let issued = service.issue(&user, Some(&SessionId::new()), kind).unwrap();
                assert_eq!(service.verify(&issued.token).unwrap(), issued.claims);
            }
        }
    }

    #[test]
    fn test_claims_carry_identity_and_lifetimes() {
        let (service, clock) = service();
        let user = user();
        let session_id = SessionId::new();

        let pair = service.issue_pair(&user, &session_id).unwrap();
        let access = service.verify_kind(&pair.access_token, TokenType::Access).unwrap();
        let refresh = service.verify_kind(&pair.refresh_token, TokenType::Refresh).unwrap();

        assert_eq!(access.sub, user.id.as_uuid().to_string());
        assert_eq!(access.email, user.email);
        assert_eq!(access.role, UserRole::Admin);
        assert_eq!(access.sid, Some(session_id.as_uuid().to_string()));
        assert_eq!(access.exp - clock.now().timestamp(), 30 * 60);
        assert_eq!(refresh.exp - clock.now().timestamp(), 7 * 24 * 60 * 60);
        assert_eq!(pair.refresh_jti, refresh.jti);
        assert_eq!(access.iss, "clinicbook");
        assert_eq!(access.aud, "clinicbook-web");
    }

    #[test]
    fn test_expiry_boundary() {
        let (service, clock) = service();
        let issued = service.issue(&user(), None, TokenType::Access).unwrap();

        clock.advance(Duration::minutes(30) - Duration::seconds(1));
        assert!(service.verify(&issued.token).is_ok());

        clock.advance(Duration::seconds(2));
        assert!(matches!(service.verify(&issued.token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_tampered_payload_is_invalid() {
        let (service, _) = service();
        let issued = service.issue(&user(), None, TokenType::Access).unwrap();
        let segments: Vec<&str> = issued.token.split('.').collect();
        assert_eq!(segments.len(), 3);

        for index in [0, segments[1].len() / 2, segments[1].len() - 1] {
            let mut payload: Vec<u8> = segments[1].as_bytes().to_vec();
            payload[index] = if payload[index] == b'A' { b'B' } else { b'A' };
            let tampered = format!(
                "{}.{}.{}",
                segments[0],
                String::from_utf8(payload).unwrap(),
                segments[2]
            );

            assert!(matches!(service.verify(&tampered), Err(AuthError::InvalidToken)));
        }
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let (service, clock) = service();
        let issued = service.issue(&user(), None, TokenType::Access).unwrap();

        let other = TokenService::new(
            TokenConfig {
                secret: "another-secret-key-that-is-32-bytes-long".to_string(),
                ..TokenConfig::default()
            },
            Arc::new(clock),
        );
        assert!(matches!(other.verify(&issued.token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_audience_mismatch_is_invalid() {
        let (service, clock) = service();
        let issued = service.issue(&user(), None, TokenType::Access).unwrap();

        let other = TokenService::new(
            TokenConfig {
                audience: "clinicbook-admin".to_string(),
                ..test_config()
            },
            Arc::new(clock),
        );
        assert!(matches!(other.verify(&issued.token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_malformed_tokens_are_invalid() {
        let (service, _) = service();
        for token in ["", "invalid-token", "a.b", "a.b.c", "....."] {
            assert!(matches!(service.verify(token), Err(AuthError::InvalidToken)));
        }
    }

    #[test]
    fn test_access_token_fails_as_refresh() {
        let (service, _) = service();
        let issued = service.issue(&user(), None, TokenType::Access).unwrap();
        let result = service.verify_kind(&issued.token, TokenType::Refresh);
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_decode_ignores_expiry_and_tag() {
        let (service, clock) = service();
        let issued = service.issue(&user(), None, TokenType::Access).unwrap();

        clock.advance(Duration::hours(2));

        assert_eq!(service.decode(&issued.token).unwrap(), issued.claims);
        assert!(service.is_expired(&issued.token));
    }

    #[test]
    fn test_time_remaining() {
        let (service, clock) = service();
        let issued = service.issue(&user(), None, TokenType::Access).unwrap();

        clock.advance(Duration::minutes(10));
        assert_eq!(service.time_remaining(&issued.token).as_secs(), 20 * 60);
        assert!(!service.is_expired(&issued.token));

        clock.advance(Duration::minutes(25));
        assert_eq!(service.time_remaining(&issued.token), std::time::Duration::ZERO);
        assert_eq!(service.time_remaining("garbage"), std::time::Duration::ZERO);
        assert!(service.is_expired("garbage"));
    }
}
