use crate::config::AuthConfig;
use crate::domain::actor::Actor;
use crate::domain::auth::Claims;
use crate::domain::session::Session;
use crate::error::Result;
use opentelemetry::{KeyValue, global, metrics::Counter};

#[derive(Clone, Debug)]
struct Metrics {
    verifications_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("golfchat-server");
        Self {
            verifications_total: meter
                .u64_counter("golfchat_auth_verifications_total")
                .with_description("Session token verifications by outcome")
                .build(),
        }
    }
}

/// Verifies session tokens issued by the external authentication system.
#[derive(Clone, Debug)]
pub struct AuthService {
    config: AuthConfig,
    metrics: Metrics,
}

impl AuthService {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self { config, metrics: Metrics::new() }
    }

    /// Verifies a bearer token and opens a session for its actor.
    ///
    /// # Errors
    /// Returns `AppError::AuthError` if the token is malformed, forged or expired.
    pub fn verify(&self, token: &str) -> Result<Session> {
        match Claims::decode(token, &self.config.jwt_secret) {
            Ok(claims) => {
                self.metrics.verifications_total.add(1, &[KeyValue::new("status", "ok")]);
                Ok(Session::new(claims.actor()))
            }
            Err(e) => {
                self.metrics.verifications_total.add(1, &[KeyValue::new("status", "rejected")]);
                Err(e)
            }
        }
    }

    /// Mints a token for `actor`. Used by tooling and tests standing in for the
    /// authentication system.
    ///
    /// # Errors
    /// Returns `AppError::Internal` if signing fails.
    pub fn issue(&self, actor: Actor) -> Result<String> {
        Claims::new(actor, self.config.token_ttl_secs).encode(&self.config.jwt_secret)
    }
}
