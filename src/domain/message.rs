use crate::domain::actor::{Actor, ActorKind};
use crate::error::ValidationError;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// A stored record that does not describe a valid golfer/professional message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed message record: {0}")]
pub struct MalformedMessage(pub &'static str);

/// The unordered (golfer, professional) key a conversation is identified by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationPair {
    golfer_id: Uuid,
    pga_id: Uuid,
}

impl ConversationPair {
    #[must_use]
    pub const fn new(golfer_id: Uuid, pga_id: Uuid) -> Self {
        Self { golfer_id, pga_id }
    }

    /// Builds the pair for two participants, in either order.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidPairing` if both actors are of the same kind.
    pub const fn between(a: Actor, b: Actor) -> Result<Self, ValidationError> {
        match (a.kind, b.kind) {
            (ActorKind::Golfer, ActorKind::Pga) => Ok(Self::new(a.id, b.id)),
            (ActorKind::Pga, ActorKind::Golfer) => Ok(Self::new(b.id, a.id)),
            _ => Err(ValidationError::InvalidPairing),
        }
    }

    #[must_use]
    pub const fn golfer_id(&self) -> Uuid {
        self.golfer_id
    }

    #[must_use]
    pub const fn pga_id(&self) -> Uuid {
        self.pga_id
    }

    #[must_use]
    pub fn contains(&self, message: &Message) -> bool {
        message.pair() == *self
    }
}

/// Role encoding used by the store: exactly one sender column and exactly one
/// receiver column is set, and the column implies the actor kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionalFields {
    pub sender_golfer_id: Option<Uuid>,
    pub sender_pga_id: Option<Uuid>,
    pub receiver_golfer_id: Option<Uuid>,
    pub receiver_pga_id: Option<Uuid>,
}

impl DirectionalFields {
    #[must_use]
    pub const fn encode(sender: Actor, receiver: Actor) -> Self {
        let mut fields = Self {
            sender_golfer_id: None,
            sender_pga_id: None,
            receiver_golfer_id: None,
            receiver_pga_id: None,
        };
        match sender.kind {
            ActorKind::Golfer => fields.sender_golfer_id = Some(sender.id),
            ActorKind::Pga => fields.sender_pga_id = Some(sender.id),
        }
        match receiver.kind {
            ActorKind::Golfer => fields.receiver_golfer_id = Some(receiver.id),
            ActorKind::Pga => fields.receiver_pga_id = Some(receiver.id),
        }
        fields
    }

    /// Recovers `(sender, receiver)` from the column pair.
    ///
    /// # Errors
    /// Returns `MalformedMessage` unless exactly one column is set per side
    /// and the two sides are of different kinds.
    pub fn decode(&self) -> Result<(Actor, Actor), MalformedMessage> {
        let sender = match (self.sender_golfer_id, self.sender_pga_id) {
            (Some(id), None) => Actor::golfer(id),
            (None, Some(id)) => Actor::pga(id),
            (None, None) => return Err(MalformedMessage("no sender column set")),
            (Some(_), Some(_)) => return Err(MalformedMessage("both sender columns set")),
        };
        let receiver = match (self.receiver_golfer_id, self.receiver_pga_id) {
            (Some(id), None) => Actor::golfer(id),
            (None, Some(id)) => Actor::pga(id),
            (None, None) => return Err(MalformedMessage("no receiver column set")),
            (Some(_), Some(_)) => return Err(MalformedMessage("both receiver columns set")),
        };
        if sender.kind == receiver.kind {
            return Err(MalformedMessage("sender and receiver share a kind"));
        }
        Ok((sender, receiver))
    }
}

/// A validated message that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    sender: Actor,
    receiver: Actor,
    text: String,
}

impl NewMessage {
    /// Validates a raw draft. The stored text is the trimmed input.
    ///
    /// # Errors
    /// Returns `ValidationError::EmptyText` for whitespace-only input and
    /// `ValidationError::InvalidPairing` when both actors are of the same kind.
    pub fn new(sender: Actor, receiver: Actor, raw_text: &str) -> Result<Self, ValidationError> {
        let text = raw_text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        if sender.kind == receiver.kind {
            return Err(ValidationError::InvalidPairing);
        }
        Ok(Self { sender, receiver, text: text.to_string() })
    }

    #[must_use]
    pub const fn sender(&self) -> Actor {
        self.sender
    }

    #[must_use]
    pub const fn receiver(&self) -> Actor {
        self.receiver
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn directional_fields(&self) -> DirectionalFields {
        DirectionalFields::encode(self.sender, self.receiver)
    }
}

/// An immutable, store-assigned message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: Uuid,
    seq: i64,
    sender: Actor,
    receiver: Actor,
    text: String,
    created_at: OffsetDateTime,
}

impl Message {
    /// Assembles a message from store-assigned parts.
    ///
    /// # Errors
    /// Returns `MalformedMessage` if the parts violate the pairing or
    /// non-empty invariants.
    pub fn from_store(
        id: Uuid,
        seq: i64,
        fields: DirectionalFields,
        text: String,
        created_at: OffsetDateTime,
    ) -> Result<Self, MalformedMessage> {
        let (sender, receiver) = fields.decode()?;
        if text.trim().is_empty() {
            return Err(MalformedMessage("empty text"));
        }
        Ok(Self { id, seq, sender, receiver, text, created_at })
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn seq(&self) -> i64 {
        self.seq
    }

    #[must_use]
    pub const fn sender(&self) -> Actor {
        self.sender
    }

    #[must_use]
    pub const fn receiver(&self) -> Actor {
        self.receiver
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    /// Conversation order: creation time, then insertion sequence.
    #[must_use]
    pub const fn order_key(&self) -> (OffsetDateTime, i64) {
        (self.created_at, self.seq)
    }

    #[must_use]
    pub const fn directional_fields(&self) -> DirectionalFields {
        DirectionalFields::encode(self.sender, self.receiver)
    }

    #[must_use]
    pub const fn pair(&self) -> ConversationPair {
        match self.sender.kind {
            ActorKind::Golfer => ConversationPair::new(self.sender.id, self.receiver.id),
            ActorKind::Pga => ConversationPair::new(self.receiver.id, self.sender.id),
        }
    }
}
