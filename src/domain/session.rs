use crate::domain::actor::Actor;

/// The authenticated actor a request or live view runs on behalf of.
///
/// A `Session` is created once per request (or per WebSocket connection) from
/// verified claims and passed explicitly into the messaging services. It ends
/// when the owning request or connection is dropped; nothing about it is held
/// in process-wide state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    actor: Actor,
}

impl Session {
    #[must_use]
    pub const fn new(actor: Actor) -> Self {
        Self { actor }
    }

    #[must_use]
    pub const fn actor(&self) -> Actor {
        self.actor
    }
}
