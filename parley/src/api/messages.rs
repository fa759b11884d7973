use serde_json::json;
use tracing::{debug, info};

use super::Platform;
use crate::error::{ClientError, ClientResult};
use crate::models::Message;

impl Platform {
    /// Messages of a chat in send order, each enriched with its sender.
    ///
    /// Fails with `AccessDenied` when the user is not a member.
    pub async fn fetch_chat_messages(&self, chat_id: &str, user_id: &str) -> ClientResult<Vec<Message>> {
        let chat_id = chat_id.trim();
        let user_id = user_id.trim();
        if chat_id.is_empty() {
            return Err(ClientError::validation("Invalid chat id"));
        }

        self.ensure_membership(chat_id, user_id).await?;

        let messages: Vec<Message> = self
            .from("messages")
            .select("*")
            .eq("chat_id", chat_id)
            .order("created_at", true)
            .fetch()
            .await?;

        let users = self.fetch_users_for_chat(chat_id).await?;

        let enriched: Vec<Message> = messages
            .into_iter()
            .map(|msg| match users.get(&msg.sender_id) {
                Some(sender) => msg.with_sender(sender.clone()),
                None => Message {
                    sender: None,
                    sender_name: Some("Unknown".to_string()),
                    ..msg
                },
            })
            .collect();

        debug!(chat_id, count = enriched.len(), "Fetched messages");
        Ok(enriched)
    }

    /// Insert a message after checking the sender may post to the chat
    pub async fn send_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: &str,
        file_url: Option<&str>,
    ) -> ClientResult<Message> {
        self.ensure_membership(chat_id, sender_id).await?;

        let row = json!([{
            "chat_id": chat_id,
            "sender_id": sender_id,
            "content": content,
            "file_url": file_url,
            "created_at": chrono::Utc::now().to_rfc3339(),
        }]);

        let stored: Message = self
            .from("messages")
            .insert(&row)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::remote(500, "message insert returned no row"))?;

        info!(chat_id, message_id = %stored.id, "Message sent");
        Ok(stored)
    }
}
