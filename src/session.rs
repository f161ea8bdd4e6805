//! Bearer session supplied by the login flow. The portfolio service verifies the
//! signature; here the claims are only read to know when the token expires.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::error::TradingError;

/// JWT claims: `sub` = user reference, `exp` (expiry), `iat` (issued at).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    /// Not every issuer sets it.
    #[serde(default)]
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    claims: Option<Claims>,
}

impl Session {
    /// Accepts any non-empty token. Tokens that are not JWTs are treated as opaque and
    /// never expire locally.
    pub fn new(token: impl Into<String>) -> Result<Self, TradingError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(TradingError::Unauthenticated);
        }
        let claims = read_claims(&token);
        Ok(Self { token, claims })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.claims.as_ref().map(|c| c.sub.as_str())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims
            .as_ref()
            .and_then(|c| Utc.timestamp_opt(c.exp, 0).single())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| exp <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

fn read_claims(token: &str) -> Option<Claims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .ok()
}
