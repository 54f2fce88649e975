use crate::adapters::database::records::MessageRecord;
use crate::domain::message::{ConversationPair, Message, NewMessage};
use crate::services::store::StoreError;
use sqlx::PgConnection;

#[derive(Clone, Debug, Default)]
pub struct MessageRepository {}

impl MessageRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Appends a message. Id, sequence and timestamp come from column defaults.
    ///
    /// # Errors
    /// Returns `StoreError::Database` if the insert fails (including foreign key
    /// or check violations) and `StoreError::Malformed` if the returned row
    /// cannot be mapped back to a message.
    #[tracing::instrument(level = "debug", skip(self, conn, message))]
    pub(crate) async fn create(&self, conn: &mut PgConnection, message: &NewMessage) -> Result<Message, StoreError> {
        let fields = message.directional_fields();

        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (sender_golfer_id, sender_pga_id, receiver_golfer_id, receiver_pga_id, text)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, seq, sender_golfer_id, sender_pga_id, receiver_golfer_id, receiver_pga_id, text, created_at
            "#,
        )
        .bind(fields.sender_golfer_id)
        .bind(fields.sender_pga_id)
        .bind(fields.receiver_golfer_id)
        .bind(fields.receiver_pga_id)
        .bind(message.text())
        .fetch_one(conn)
        .await?;

        Ok(Message::try_from(record)?)
    }

    /// Fetches the whole conversation of a pair, in either direction.
    ///
    /// # Errors
    /// Returns `StoreError::Database` if the query fails and
    /// `StoreError::Malformed` if any row violates the directional encoding.
    #[tracing::instrument(level = "debug", skip(self, conn), fields(golfer_id = %pair.golfer_id(), pga_id = %pair.pga_id()))]
    pub(crate) async fn fetch_conversation(
        &self,
        conn: &mut PgConnection,
        pair: ConversationPair,
    ) -> Result<Vec<Message>, StoreError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, seq, sender_golfer_id, sender_pga_id, receiver_golfer_id, receiver_pga_id, text, created_at
            FROM messages
            WHERE (sender_golfer_id = $1 AND receiver_pga_id = $2)
               OR (sender_pga_id = $2 AND receiver_golfer_id = $1)
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(pair.golfer_id())
        .bind(pair.pga_id())
        .fetch_all(conn)
        .await?;

        records.into_iter().map(|record| Message::try_from(record).map_err(StoreError::from)).collect()
    }
}
