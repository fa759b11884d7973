//! Pure merge steps applied when messages arrive.

use std::collections::HashMap;

use crate::models::{Chat, Message, User};

/// Append unless a message with the same id is already present.
/// Returns whether the list grew.
///
/// A known copy that arrived without a resolved sender takes the sender of
/// the redelivered one.
pub fn append_unique(list: &mut Vec<Message>, message: Message) -> bool {
    if let Some(existing) = list.iter_mut().find(|m| m.id == message.id) {
        if existing.sender.is_none() && message.sender.is_some() {
            existing.sender = message.sender;
            existing.sender_name = message.sender_name;
        }
        return false;
    }
    list.push(message);
    true
}

/// Sender from what is already known locally: the user cache first, then the
/// members of the open chat
pub fn local_sender(
    users: &HashMap<String, User>,
    open_chat: Option<&Chat>,
    sender_id: &str,
) -> Option<User> {
    users
        .get(sender_id)
        .cloned()
        .or_else(|| open_chat.and_then(|chat| chat.member(sender_id).cloned()))
}

/// Move the message's chat to the front of the list and append the message
/// to its slice. Returns `false` when the chat is not in the list.
pub fn bump_chat(chats: &mut Vec<Chat>, message: &Message) -> bool {
    let Some(index) = chats.iter().position(|c| c.id == message.chat_id) else {
        return false;
    };

    let mut chat = chats.remove(index);
    append_unique(&mut chat.messages, message.clone());
    chats.insert(0, chat);
    true
}

/// Give a fetched message a sender, synthesizing one when the row carried
/// none
pub fn normalize_sender(message: Message) -> Message {
    if message.sender.is_some() {
        return message;
    }
    let mut sender = User::placeholder(&message.sender_id);
    if let Some(name) = message.sender_name.as_deref().filter(|n| !n.is_empty()) {
        sender.full_name = Some(name.to_string());
    }
    message.with_sender(sender)
}

/// Chats whose name, or for direct chats the other member's email, contains
/// `query` (case-insensitive). An empty query keeps everything.
pub fn filter_chats<'a>(chats: &'a [Chat], query: &str, viewer_id: &str) -> Vec<&'a Chat> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return chats.iter().collect();
    }

    chats
        .iter()
        .filter(|chat| {
            let by_name = chat
                .name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&needle));
            let by_email = !chat.is_group
                && chat
                    .other_member(viewer_id)
                    .is_some_and(|u| u.email.to_lowercase().contains(&needle));
            by_name || by_email
        })
        .collect()
}
