use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Golfer,
    Pga,
}

impl ActorKind {
    /// The only kind this kind may exchange messages with.
    #[must_use]
    pub const fn counterpart(self) -> Self {
        match self {
            Self::Golfer => Self::Pga,
            Self::Pga => Self::Golfer,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Golfer => "golfer",
            Self::Pga => "pga",
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A golfer or PGA professional taking part in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub kind: ActorKind,
}

impl Actor {
    #[must_use]
    pub const fn golfer(id: Uuid) -> Self {
        Self { id, kind: ActorKind::Golfer }
    }

    #[must_use]
    pub const fn pga(id: Uuid) -> Self {
        Self { id, kind: ActorKind::Pga }
    }

    /// Builds the actor on the other side of a conversation with `self`.
    #[must_use]
    pub const fn counterpart(&self, id: Uuid) -> Self {
        Self { id, kind: self.kind.counterpart() }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
