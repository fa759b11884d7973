use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::label::Label;
use super::message::Message;
use super::user::User;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Chat {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, with = "crate::utils::timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "chat_labels")]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub members: Vec<User>,
    /// Most recent messages, for list display only
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Chat {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            is_group: false,
            avatar_url: None,
            created_at: None,
            labels: Vec::new(),
            members: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }

    pub fn member(&self, user_id: &str) -> Option<&User> {
        self.members.iter().find(|m| m.id == user_id)
    }

    /// The counterpart in a direct chat
    pub fn other_member(&self, viewer_id: &str) -> Option<&User> {
        self.members.iter().find(|m| m.id != viewer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_row_with_join_labels() {
        let json = r##"{
            "id": "c1",
            "name": null,
            "is_group": false,
            "created_at": "2024-05-01T10:00:00+00:00",
            "chat_labels": [
                {"id": "cl1", "label_id": "l1", "labels": {"id": "l1", "name": "VIP", "color": "#3B82F6"}}
            ]
        }"##;
        let chat: Chat = serde_json::from_str(json).unwrap();
        assert_eq!(chat.labels.len(), 1);
        assert!(chat.has_label("VIP"));
        assert!(chat.members.is_empty());
        assert!(chat.last_message().is_none());
    }

    #[test]
    fn test_deserialize_row_with_string_labels() {
        let json = r#"{"id": "c1", "is_group": true, "name": "Team", "labels": ["a", "b"]}"#;
        let chat: Chat = serde_json::from_str(json).unwrap();
        assert!(chat.has_label("a"));
        assert!(chat.has_label("b"));
        assert!(!chat.has_label("c"));
    }

    #[test]
    fn test_zone_less_created_at() {
        let json = r#"{"id": "c1", "created_at": "2024-05-01T10:00:00.123456"}"#;
        let chat: Chat = serde_json::from_str(json).unwrap();
        assert_eq!(
            chat.created_at.map(|at| at.to_rfc3339()),
            Some("2024-05-01T10:00:00.123456+00:00".to_string())
        );

        let chat: Chat = serde_json::from_str(r#"{"id": "c1", "created_at": null}"#).unwrap();
        assert!(chat.created_at.is_none());
        let chat: Chat = serde_json::from_str(r#"{"id": "c1"}"#).unwrap();
        assert!(chat.created_at.is_none());
    }

    #[test]
    fn test_other_member() {
        let mut chat = Chat::new("c1");
        chat.members = vec![User::placeholder("me"), User::placeholder("you")];
        assert_eq!(chat.other_member("me").map(|u| u.id.as_str()), Some("you"));
        assert_eq!(chat.member("you").map(|u| u.id.as_str()), Some("you"));
        assert!(chat.member("them").is_none());
    }
}
