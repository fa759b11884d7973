use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::user::User;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(with = "crate::utils::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub sender: Option<User>,
    #[serde(default)]
    pub sender_name: Option<String>,
}

/// What a message carries, derived from its content tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image { caption: String },
    Audio { caption: String },
    File { caption: String },
}

impl Message {
    /// Decode a row pushed by the realtime service.
    ///
    /// Returns `None` for payloads missing any of id, sender id, content or
    /// creation time.
    pub fn from_record(record: &Value) -> Option<Self> {
        serde_json::from_value(record.clone()).ok()
    }

    pub fn kind(&self) -> MessageKind {
        let content = self.content.as_str();
        if let Some(rest) = content.strip_prefix("[Image]") {
            MessageKind::Image {
                caption: rest.trim().to_string(),
            }
        } else if let Some(rest) = content.strip_prefix("[Audio]") {
            MessageKind::Audio {
                caption: rest.trim().to_string(),
            }
        } else if let Some(rest) = content.strip_prefix("[File]") {
            MessageKind::File {
                caption: rest.trim().to_string(),
            }
        } else {
            MessageKind::Text
        }
    }

    /// Attach a resolved sender and its display name
    pub fn with_sender(mut self, sender: User) -> Self {
        self.sender_name = Some(sender.sender_name());
        self.sender = Some(sender);
        self
    }

    /// Name to render next to the message
    pub fn display_sender(&self) -> String {
        if let Some(sender) = &self.sender {
            return sender.sender_name();
        }
        self.sender_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.sender_id.clone())
    }
}
