use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::user::{User, UserRole};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid expiration format")]
    InvalidExpirationFormat,
    #[error("Unsupported expiration unit: {0}")]
    UnsupportedExpirationUnit(char),
    #[error("Token expired")]
    Expired,
    #[error("Malformed token")]
    Malformed,
    #[error("Invalid token signature")]
    InvalidSignature,
    #[error("Token payload has no user id")]
    MissingUserId,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub name: String,
    pub phone: Option<String>,
    /// Unique per issuance. `iat`/`exp` only have second granularity, so
    /// without this two tokens minted in the same second would be
    /// byte-identical and collide on the stored refresh-token hash.
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// The identity fields that go into a token, normalized once at the
/// boundary. Role is always the enum here, never a raw string.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub name: String,
    pub phone: Option<String>,
}

impl From<&User> for TokenSubject {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            name: user.name.clone(),
            phone: user.phone.clone(),
        }
    }
}

impl From<&Claims> for TokenSubject {
    fn from(claims: &Claims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email.clone(),
            role: claims.role,
            name: claims.name.clone(),
            phone: claims.phone.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Parse a duration string of the form `<n>s|m|h|d` into seconds.
pub fn parse_expiration(expires_in: &str) -> Result<i64, TokenError> {
    if expires_in.len() < 2 {
        return Err(TokenError::InvalidExpirationFormat);
    }

    // Split on the last char boundary, not the last byte; the unit may be
    // a multibyte character and still has to come back as an error.
    let (unit_start, unit) = expires_in
        .char_indices()
        .next_back()
        .ok_or(TokenError::InvalidExpirationFormat)?;
    let value = &expires_in[..unit_start];

    let value: i64 = value
        .parse()
        .map_err(|_| TokenError::InvalidExpirationFormat)?;
    if value <= 0 {
        return Err(TokenError::InvalidExpirationFormat);
    }

    match unit {
        's' => Ok(value),
        'm' => Ok(value * 60),
        'h' => Ok(value * 3600),
        'd' => Ok(value * 86400),
        other => Err(TokenError::UnsupportedExpirationUnit(other)),
    }
}

/// Deterministic sha-256 hex digest of a raw token. Persisted stores
/// (refresh tokens, blacklist) only ever see this, never the raw token.
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

pub trait TokenCodec: Send + Sync {
    fn encode_claims(&self, claims: &Claims) -> Result<String, TokenError>;
    fn verify(&self, token: &str) -> Result<Claims, TokenError>;

    fn generate(&self, subject: &TokenSubject, expires_in: &str) -> Result<IssuedToken, TokenError> {
        let ttl_secs = parse_expiration(expires_in)?;
        let now = Utc::now();
        let claims = Claims {
            user_id: subject.user_id,
            email: subject.email.clone(),
            role: subject.role,
            name: subject.name.clone(),
            phone: subject.phone.clone(),
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: now.timestamp() + ttl_secs,
        };

        let token = self.encode_claims(&claims)?;
        Ok(IssuedToken {
            token,
            expires_at: claims.expires_at(),
        })
    }
}

/// Require a `user_id` field before deserializing the rest, so a payload
/// without one is reported distinctly from generic decode garbage.
fn claims_from_value(value: serde_json::Value) -> Result<Claims, TokenError> {
    match value.get("user_id") {
        None | Some(serde_json::Value::Null) => return Err(TokenError::MissingUserId),
        Some(_) => {}
    }
    serde_json::from_value(value).map_err(|_| TokenError::Malformed)
}

/// HS256-signed production codec.
pub struct SignedCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SignedCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
        }
    }
}

impl TokenCodec for SignedCodec {
    fn encode_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::default(), claims, &self.encoding_key).map_err(|_| TokenError::Malformed)
    }

    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        if token.trim().is_empty() {
            return Err(TokenError::Malformed);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        match decode::<serde_json::Value>(token, &self.decoding_key, &validation) {
            Ok(data) => claims_from_value(data.claims),
            Err(err) => match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(TokenError::Expired),
                jsonwebtoken::errors::ErrorKind::InvalidSignature => Err(TokenError::InvalidSignature),
                _ => Err(TokenError::Malformed),
            },
        }
    }
}

/// Unsigned base64url(JSON) codec for test environments only. Constructed
/// by startup configuration when ALLOW_INSECURE_TEST_TOKENS=true; request
/// handling never branches between codecs at runtime.
pub struct InsecureTestCodec;

impl TokenCodec for InsecureTestCodec {
    fn encode_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        let json = serde_json::to_vec(claims).map_err(|_| TokenError::Malformed)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        if token.trim().is_empty() {
            return Err(TokenError::Malformed);
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| TokenError::Malformed)?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)?;

        let exp = value
            .get("exp")
            .and_then(serde_json::Value::as_i64)
            .ok_or(TokenError::Malformed)?;
        if exp < Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }

        claims_from_value(value)
    }
}
