//! Access and refresh tokens.
//!
//! Tokens are EdDSA (Ed25519) JWTs. Access tokens carry
//! `{sub, email, role, type:"access", jti, iat, exp, iss, aud}` and live for
//! the configured access TTL. Refresh tokens carry
//! `{sub, type:"refresh", jti, iat, exp, iss, aud}`.
//!
//! Every refresh token is mirrored in the store under
//! `refresh_token:{token}` with a TTL equal to its lifetime. A refresh token is
//! only redeemable while its mirror exists, so deleting the mirror revokes it
//! even though the signature stays valid.
//!
//! Access tokens can be revoked individually by `jti` through
//! `revoked_token:{jti}`, kept for one access TTL.
//!
//! Expiry is checked against the injected [`Clock`], not the system time, so
//! tests can move time forward.

use std::{fmt, sync::Arc};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use warden_storage::{Clock, StoreClient, keys};
use zeroize::Zeroizing;

use crate::{
    config::TokenConfig,
    error::{AuthError, Result},
    ids,
    types::Role,
    validation::checked_header,
};

/// Random bytes in a `jti`.
const JTI_BYTES: usize = 16;

/// PKCS#8 v1 prefix for an Ed25519 private key; the 32-byte seed follows.
const ED25519_PKCS8_PREFIX: [u8; 16] = [
    0x30, 0x2e, // SEQUENCE, 46 bytes
    0x02, 0x01, 0x00, // INTEGER version 0
    0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
    0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
    0x04, 0x22, // OCTET STRING, 34 bytes
    0x04, 0x20, // OCTET STRING, 32 bytes (the actual key)
];

/// Ed25519 key pair used to sign and verify tokens.
#[derive(Clone)]
pub struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    public_key: String,
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys").field("public_key", &self.public_key).finish_non_exhaustive()
    }
}

impl SigningKeys {
    /// Generates a fresh key pair from the OS random source.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if the public key cannot be loaded.
    pub fn generate() -> Result<Self> {
        Self::from_signing_key(&SigningKey::generate(&mut OsRng))
    }

    /// Loads a key pair from a 32-byte Ed25519 seed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if the public key cannot be loaded.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self> {
        Self::from_signing_key(&SigningKey::from_bytes(seed))
    }

    fn from_signing_key(signing_key: &SigningKey) -> Result<Self> {
        let public_key = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());

        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(signing_key.to_bytes());
        let mut pkcs8_der = Zeroizing::new(ED25519_PKCS8_PREFIX.to_vec());
        pkcs8_der.extend_from_slice(&*seed);

        let encoding = EncodingKey::from_ed_der(&pkcs8_der);
        let decoding = DecodingKey::from_ed_components(&public_key)
            .map_err(|e| AuthError::internal(format!("invalid Ed25519 public key: {e}")))?;

        Ok(Self { encoding, decoding, public_key })
    }

    /// The public key, base64url without padding.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }
}

/// `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Claims carried by both token types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id.
    pub sub: String,
    /// Access tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Access tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// A freshly issued access and refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Redemption record stored under `refresh_token:{token}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRecord {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of [`TokenService::validate`].
#[derive(Debug)]
pub enum TokenValidation {
    Valid(TokenClaims),
    /// Why the token was rejected; for logs only.
    Invalid(AuthError),
}

impl TokenValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn claims(&self) -> Option<&TokenClaims> {
        match self {
            Self::Valid(claims) => Some(claims),
            Self::Invalid(_) => None,
        }
    }

    /// Converts into a `Result` for `?` propagation.
    pub fn into_result(self) -> Result<TokenClaims> {
        match self {
            Self::Valid(claims) => Ok(claims),
            Self::Invalid(err) => Err(err),
        }
    }
}

#[derive(Clone)]
pub struct TokenService {
    store: StoreClient,
    clock: Arc<dyn Clock>,
    keys: Arc<SigningKeys>,
    config: TokenConfig,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("keys", &self.keys)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(
        store: StoreClient,
        clock: Arc<dyn Clock>,
        keys: Arc<SigningKeys>,
        config: TokenConfig,
    ) -> Self {
        Self { store, clock, keys, config }
    }

    /// Issues an access and refresh token for `subject` and stores the
    /// refresh mirror.
    ///
    /// A mirror write lost to a store outage is logged and absorbed; the
    /// refresh token is then simply not redeemable.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if signing fails.
    #[tracing::instrument(skip(self, email))]
    pub async fn issue_pair(&self, subject: &str, email: &str, role: Role) -> Result<TokenPair> {
        let access_token = self.issue_access_token(subject, email, role)?;

        let now = self.clock.now();
        let claims = TokenClaims {
            sub: subject.to_owned(),
            email: None,
            role: None,
            token_type: TokenType::Refresh,
            jti: ids::random_hex(JTI_BYTES),
            iat: now.timestamp(),
            exp: expiry(now, self.config.refresh_ttl),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };
        let refresh_token = self.sign(&claims)?;

        let record = RefreshRecord { user_id: subject.to_owned(), created_at: now };
        let key = keys::refresh_token(&refresh_token);
        if !self.store.set_json_with_ttl(&key, &record, self.config.refresh_ttl).await {
            tracing::warn!("refresh token mirror not persisted");
        }

        Ok(TokenPair { access_token, refresh_token })
    }

    /// Signs a new access token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if signing fails.
    pub fn issue_access_token(&self, subject: &str, email: &str, role: Role) -> Result<String> {
        let now = self.clock.now();
        self.sign(&TokenClaims {
            sub: subject.to_owned(),
            email: Some(email.to_owned()),
            role: Some(role),
            token_type: TokenType::Access,
            jti: ids::random_hex(JTI_BYTES),
            iat: now.timestamp(),
            exp: expiry(now, self.config.access_ttl),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        })
    }

    /// Verifies a refresh token and checks its mirror.
    ///
    /// Returns `None` if the signature, expiry, type, issuer or audience is
    /// wrong, or if the mirror is missing or belongs to another user. A store
    /// outage also yields `None`.
    #[tracing::instrument(skip_all)]
    pub async fn redeem_refresh_token(&self, refresh_token: &str) -> Option<TokenClaims> {
        let claims = match self.verify(refresh_token, TokenType::Refresh) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::debug!(error = %err, "refresh token rejected");
                return None;
            },
        };

        let record: RefreshRecord =
            self.store.get_json(&keys::refresh_token(refresh_token)).await?;
        if record.user_id != claims.sub {
            tracing::warn!(sub = %claims.sub, "refresh mirror belongs to another user");
            return None;
        }
        Some(claims)
    }

    /// Mints a new access token from a redeemable refresh token.
    ///
    /// The refresh token itself is not rotated.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        email: &str,
        role: Role,
    ) -> Option<String> {
        let claims = self.redeem_refresh_token(refresh_token).await?;
        match self.issue_access_token(&claims.sub, email, role) {
            Ok(token) => Some(token),
            Err(err) => {
                tracing::error!(error = %err, "access token signing failed");
                None
            },
        }
    }

    /// Deletes a refresh token's mirror. Returns whether one existed.
    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> bool {
        self.store.delete(&keys::refresh_token(refresh_token)).await
    }

    /// Puts `jti` on the revocation list for one access TTL.
    #[tracing::instrument(skip(self))]
    pub async fn revoke(&self, jti: &str) -> bool {
        let revoked_at = self.clock.now().to_rfc3339();
        self.store.set_with_ttl(&keys::revoked_token(jti), revoked_at, self.config.access_ttl).await
    }

    /// Whether `jti` is on the revocation list.
    ///
    /// When the store is unreachable the answer follows the store client's
    /// failure policy.
    pub async fn is_revoked(&self, jti: &str) -> bool {
        self.store.exists(&keys::revoked_token(jti)).await
    }

    /// Validates an access token.
    ///
    /// Checks the algorithm, signature, expiry, `type`, `iss`, `aud` and the
    /// revocation list.
    #[tracing::instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> TokenValidation {
        let claims = match self.verify(token, TokenType::Access) {
            Ok(claims) => claims,
            Err(err) => return TokenValidation::Invalid(err),
        };
        if self.is_revoked(&claims.jti).await {
            return TokenValidation::Invalid(AuthError::TokenRevoked);
        }
        TokenValidation::Valid(claims)
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String> {
        jsonwebtoken::encode(&Header::new(Algorithm::EdDSA), claims, &self.keys.encoding)
            .map_err(|e| AuthError::internal(format!("token signing failed: {e}")))
    }

    fn verify(&self, token: &str, expected: TokenType) -> Result<TokenClaims> {
        checked_header(token)?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        // Expiry is checked below against the injected clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let claims = jsonwebtoken::decode::<TokenClaims>(token, &self.keys.decoding, &validation)?
            .claims;

        if claims.exp <= self.clock.now().timestamp() {
            return Err(AuthError::TokenExpired);
        }
        if claims.token_type != expected {
            return Err(AuthError::token_invalid(format!(
                "expected {} token, got {}",
                expected.as_str(),
                claims.token_type.as_str()
            )));
        }
        Ok(claims)
    }
}

fn expiry(now: DateTime<Utc>, ttl: std::time::Duration) -> i64 {
    now.timestamp().saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}
