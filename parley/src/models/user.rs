use serde::{Deserialize, Serialize};

use super::display::known_user_name;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl User {
    /// Stand-in for a sender that could not be resolved anywhere
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            email: id.to_string(),
            full_name: None,
            avatar_url: None,
        }
    }

    /// Name shown next to a message. Resolved like any other display name,
    /// but an unnameable sender shows its raw id.
    pub fn sender_name(&self) -> String {
        known_user_name(self).unwrap_or_else(|| self.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(full_name: Option<&str>, email: &str) -> User {
        User {
            id: "u1".to_string(),
            email: email.to_string(),
            full_name: full_name.map(String::from),
            avatar_url: None,
        }
    }

    #[test]
    fn test_sender_name_prefers_full_name() {
        assert_eq!(user(Some("Ada Lovelace"), "ada@example.com").sender_name(), "Ada Lovelace");
    }

    #[test]
    fn test_sender_name_blank_full_name_falls_back_to_email() {
        assert_eq!(user(Some("   "), "ada@example.com").sender_name(), "ada");
    }

    #[test]
    fn test_sender_name_falls_back_to_id() {
        assert_eq!(user(None, "").sender_name(), "u1");
        assert_eq!(User::placeholder("u9").sender_name(), "u9");
    }

    #[test]
    fn test_sender_name_matches_display_name() {
        use crate::models::DisplayTarget;

        let hostless = user(None, "@host");
        assert_eq!(hostless.sender_name(), "@host");
        assert_eq!(hostless.sender_name(), DisplayTarget::User(&hostless).display_name());

        let padded = user(Some("  Ada  "), "ada@example.com");
        assert_eq!(padded.sender_name(), "Ada");
        assert_eq!(DisplayTarget::User(&padded).display_name(), "Ada");
    }

    #[test]
    fn test_deserialize_null_full_name() {
        let json = r#"{"id":"u1","email":"a@b.c","full_name":null}"#;
        let parsed: User = serde_json::from_str(json).unwrap();
        assert!(parsed.full_name.is_none());
        assert!(parsed.avatar_url.is_none());
    }
}
