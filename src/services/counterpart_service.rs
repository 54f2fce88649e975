use crate::domain::actor::{Actor, ActorKind};
use crate::error::{AppError, Result};
use crate::services::directory::DirectoryService;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of resolving who the current actor can talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Counterpart {
    /// A golfer's single, pre-assigned professional.
    Professional(Uuid),
    /// A professional's assigned golfers; the caller must pick one.
    Candidates(Vec<Uuid>),
}

#[derive(Clone, Debug)]
pub struct CounterpartService {
    directory: Arc<dyn DirectoryService>,
    timeout: Duration,
}

impl CounterpartService {
    #[must_use]
    pub fn new(directory: Arc<dyn DirectoryService>, timeout: Duration) -> Self {
        Self { directory, timeout }
    }

    /// Resolves the conversation counterpart(s) for `actor`. Read-only.
    ///
    /// # Errors
    /// Returns `AppError::NoProfessionalAssigned` for a golfer without an assignment.
    /// Returns `AppError::LookupFailed` if the directory fails or times out.
    #[tracing::instrument(err(level = "warn"), skip(self, actor), fields(actor = %actor))]
    pub async fn resolve(&self, actor: Actor) -> Result<Counterpart> {
        match actor.kind {
            ActorKind::Golfer => {
                let assigned = self.lookup(self.directory.assigned_professional(actor.id)).await?;
                assigned.map(Counterpart::Professional).ok_or(AppError::NoProfessionalAssigned)
            }
            ActorKind::Pga => {
                let golfers = self.lookup(self.directory.assigned_golfers(actor.id)).await?;
                tracing::debug!(candidates = golfers.len(), "Resolved candidate golfers");
                Ok(Counterpart::Candidates(golfers))
            }
        }
    }

    /// Confirms `counterpart_id` is within `actor`'s assignment relation and
    /// returns the counterpart actor.
    ///
    /// # Errors
    /// Returns `AppError::Forbidden` if the two are not assigned to each other,
    /// plus any error of [`CounterpartService::resolve`].
    #[tracing::instrument(
        err(level = "debug"),
        skip(self, actor, counterpart_id),
        fields(actor = %actor, counterpart_id = %counterpart_id)
    )]
    pub async fn authorize(&self, actor: Actor, counterpart_id: Uuid) -> Result<Actor> {
        let allowed = match self.resolve(actor).await {
            Ok(Counterpart::Professional(pga_id)) => pga_id == counterpart_id,
            Ok(Counterpart::Candidates(golfers)) => golfers.contains(&counterpart_id),
            Err(AppError::NoProfessionalAssigned) => false,
            Err(e) => return Err(e),
        };

        if allowed { Ok(actor.counterpart(counterpart_id)) } else { Err(AppError::Forbidden) }
    }

    async fn lookup<T, E>(&self, call: impl Future<Output = std::result::Result<T, E>>) -> Result<T>
    where
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AppError::LookupFailed(e.to_string())),
            Err(_) => Err(AppError::LookupFailed(format!("directory did not respond within {:?}", self.timeout))),
        }
    }
}
