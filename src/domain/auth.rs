use crate::domain::actor::{Actor, ActorKind};
use crate::error::{AppError, Result};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Session token claims issued by the external authentication system.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    pub kind: ActorKind,
    pub exp: usize,
}

impl Claims {
    #[must_use]
    pub fn new(actor: Actor, ttl_secs: u64) -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let exp = usize::try_from(now.saturating_add(ttl_secs)).unwrap_or(usize::MAX);

        Self { sub: actor.id, kind: actor.kind, exp }
    }

    #[must_use]
    pub const fn actor(&self) -> Actor {
        Actor { id: self.sub, kind: self.kind }
    }

    /// Signs the claims with HS256.
    ///
    /// # Errors
    /// Returns `AppError::Internal` if encoding fails.
    pub fn encode(&self, secret: &str) -> Result<String> {
        encode(&Header::default(), self, &EncodingKey::from_secret(secret.as_bytes())).map_err(|_| AppError::Internal)
    }

    /// Verifies signature and expiry.
    ///
    /// # Errors
    /// Returns `AppError::AuthError` if the token is invalid or expired.
    pub fn decode(token: &str, secret: &str) -> Result<Self> {
        let token_data =
            decode::<Self>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
                .map_err(|_| AppError::AuthError)?;

        Ok(token_data.claims)
    }
}
