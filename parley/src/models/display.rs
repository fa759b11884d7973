//! Display-name resolution for anything that shows up with a title.

use super::chat::Chat;
use super::user::User;

const UNKNOWN: &str = "Unknown";

/// Something that needs a human readable name
#[derive(Debug, Clone, Copy)]
pub enum DisplayTarget<'a> {
    User(&'a User),
    /// A chat, as seen by `viewer_id`
    Chat { chat: &'a Chat, viewer_id: &'a str },
}

impl DisplayTarget<'_> {
    pub fn display_name(&self) -> String {
        match self {
            DisplayTarget::User(user) => known_user_name(user).unwrap_or_else(|| UNKNOWN.to_string()),
            DisplayTarget::Chat { chat, viewer_id } => chat_name(chat, viewer_id),
        }
    }
}

/// Full name, else the email's local part, else the whole email
pub(crate) fn known_user_name(user: &User) -> Option<String> {
    if let Some(name) = user.full_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        return Some(name.to_string());
    }
    match user.email.split_once('@') {
        Some((local, _)) if !local.is_empty() => Some(local.to_string()),
        _ if !user.email.is_empty() => Some(user.email.clone()),
        _ => None,
    }
}

fn chat_name(chat: &Chat, viewer_id: &str) -> String {
    if let Some(name) = chat.name.as_deref().filter(|n| !n.trim().is_empty()) {
        return name.to_string();
    }
    if !chat.is_group {
        if let Some(other) = chat.other_member(viewer_id) {
            return DisplayTarget::User(other).display_name();
        }
    }
    UNKNOWN.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, email: &str, full_name: Option<&str>) -> User {
        User {
            id: id.to_string(),
            email: email.to_string(),
            full_name: full_name.map(String::from),
            avatar_url: None,
        }
    }

    #[test]
    fn test_user_names() {
        let named = user("u1", "ada@example.com", Some("Ada"));
        let unnamed = user("u2", "grace@example.com", None);
        let empty = user("u3", "", None);

        assert_eq!(DisplayTarget::User(&named).display_name(), "Ada");
        assert_eq!(DisplayTarget::User(&unnamed).display_name(), "grace");
        assert_eq!(DisplayTarget::User(&empty).display_name(), "Unknown");
    }

    #[test]
    fn test_named_chat() {
        let mut chat = Chat::new("c1");
        chat.name = Some("Launch team".to_string());
        chat.is_group = true;
        let target = DisplayTarget::Chat { chat: &chat, viewer_id: "me" };
        assert_eq!(target.display_name(), "Launch team");
    }

    #[test]
    fn test_direct_chat_uses_counterpart() {
        let mut chat = Chat::new("c1");
        chat.members = vec![
            user("me", "me@example.com", Some("Me")),
            user("u2", "grace@example.com", Some("Grace Hopper")),
        ];
        let target = DisplayTarget::Chat { chat: &chat, viewer_id: "me" };
        assert_eq!(target.display_name(), "Grace Hopper");
    }

    #[test]
    fn test_unnamed_group_is_unknown() {
        let mut chat = Chat::new("c1");
        chat.is_group = true;
        chat.members = vec![user("u2", "grace@example.com", None)];
        let target = DisplayTarget::Chat { chat: &chat, viewer_id: "me" };
        assert_eq!(target.display_name(), "Unknown");
    }
}
