use crate::domain::message::{DirectionalFields, MalformedMessage, Message};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) id: Uuid,
    pub(crate) seq: i64,
    pub(crate) sender_golfer_id: Option<Uuid>,
    pub(crate) sender_pga_id: Option<Uuid>,
    pub(crate) receiver_golfer_id: Option<Uuid>,
    pub(crate) receiver_pga_id: Option<Uuid>,
    pub(crate) text: String,
    pub(crate) created_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for Message {
    type Error = MalformedMessage;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        let fields = DirectionalFields {
            sender_golfer_id: record.sender_golfer_id,
            sender_pga_id: record.sender_pga_id,
            receiver_golfer_id: record.receiver_golfer_id,
            receiver_pga_id: record.receiver_pga_id,
        };
        Self::from_store(record.id, record.seq, fields, record.text, record.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::Actor;

    fn record(fields: DirectionalFields, text: &str) -> MessageRecord {
        MessageRecord {
            id: Uuid::new_v4(),
            seq: 7,
            sender_golfer_id: fields.sender_golfer_id,
            sender_pga_id: fields.sender_pga_id,
            receiver_golfer_id: fields.receiver_golfer_id,
            receiver_pga_id: fields.receiver_pga_id,
            text: text.to_string(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_record_maps_columns_to_actors() {
        let pro = Actor::pga(Uuid::new_v4());
        let golfer = Actor::golfer(Uuid::new_v4());

        let message = Message::try_from(record(DirectionalFields::encode(pro, golfer), "See you Thursday"))
            .expect("well-formed record");

        assert_eq!(message.sender(), pro);
        assert_eq!(message.receiver(), golfer);
        assert_eq!(message.seq(), 7);
    }

    #[test]
    fn test_record_with_missing_receiver_is_rejected() {
        let fields = DirectionalFields { sender_golfer_id: Some(Uuid::new_v4()), ..DirectionalFields::default() };
        assert!(Message::try_from(record(fields, "hi")).is_err());
    }

    #[test]
    fn test_record_with_blank_text_is_rejected() {
        let fields = DirectionalFields::encode(Actor::golfer(Uuid::new_v4()), Actor::pga(Uuid::new_v4()));
        assert!(Message::try_from(record(fields, "  ")).is_err());
    }
}
