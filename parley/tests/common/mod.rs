//! Shared fixtures for integration tests
//!
//! [`MockBackend`] stands in for the hosted platform: it serves canned rows,
//! counts every call and can be told to fail specific operations.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

use parley_lib::error::{ClientError, ClientResult};
use parley_lib::models::{Chat, Label, Message, User};
use parley_lib::ChatBackend;

pub fn user(id: &str, full_name: &str) -> User {
    User {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        full_name: Some(full_name.to_string()),
        avatar_url: None,
    }
}

pub fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
}

pub fn message(id: &str, chat_id: &str, sender_id: &str, content: &str, minute: i64) -> Message {
    Message {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        sender_id: sender_id.to_string(),
        content: content.to_string(),
        created_at: at(minute),
        file_url: None,
        sender: None,
        sender_name: None,
    }
}

pub fn direct_chat(id: &str, members: &[&User]) -> Chat {
    let mut chat = Chat::new(id);
    chat.members = members.iter().map(|u| (*u).clone()).collect();
    chat
}

pub fn group_chat(id: &str, name: &str, members: &[&User]) -> Chat {
    let mut chat = direct_chat(id, members);
    chat.name = Some(name.to_string());
    chat.is_group = true;
    chat
}

/// Row as pushed by the realtime service
pub fn record(message: &Message) -> serde_json::Value {
    serde_json::json!({
        "id": message.id,
        "chat_id": message.chat_id,
        "sender_id": message.sender_id,
        "content": message.content,
        "created_at": message.created_at.to_rfc3339(),
        "file_url": message.file_url,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub file_url: Option<String>,
}

#[derive(Default)]
struct MockState {
    chats: Vec<Chat>,
    messages: HashMap<String, Vec<Message>>,
    users: HashMap<String, User>,
    failing: HashSet<&'static str>,
    calls: HashMap<&'static str, usize>,
    sent: Vec<SentMessage>,
    uploads: Vec<(String, usize, String)>,
    next_id: usize,
}

#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chats(self, chats: Vec<Chat>) -> Self {
        self.state.lock().chats = chats;
        self
    }

    pub fn with_messages(self, chat_id: &str, messages: Vec<Message>) -> Self {
        self.state.lock().messages.insert(chat_id.to_string(), messages);
        self
    }

    pub fn with_user(self, user: User) -> Self {
        self.state.lock().users.insert(user.id.clone(), user);
        self
    }

    /// Make every later call to `operation` fail
    pub fn fail(&self, operation: &'static str) {
        self.state.lock().failing.insert(operation);
    }

    pub fn heal(&self, operation: &'static str) {
        self.state.lock().failing.remove(operation);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    /// (path, byte count, content type) of every stored object
    pub fn uploads(&self) -> Vec<(String, usize, String)> {
        self.state.lock().uploads.clone()
    }

    pub fn set_chats(&self, chats: Vec<Chat>) {
        self.state.lock().chats = chats;
    }

    pub fn push_message(&self, message: Message) {
        self.state
            .lock()
            .messages
            .entry(message.chat_id.clone())
            .or_default()
            .push(message);
    }

    fn enter(&self, operation: &'static str) -> ClientResult<()> {
        let mut state = self.state.lock();
        *state.calls.entry(operation).or_default() += 1;
        if state.failing.contains(operation) {
            return Err(ClientError::remote(500, format!("{} failed", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn fetch_user_chats(&self, _user_id: &str) -> ClientResult<Vec<Chat>> {
        self.enter("fetch_user_chats")?;
        Ok(self.state.lock().chats.clone())
    }

    async fn fetch_chat_messages(&self, chat_id: &str, _user_id: &str) -> ClientResult<Vec<Message>> {
        self.enter("fetch_chat_messages")?;
        Ok(self
            .state
            .lock()
            .messages
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: &str,
        file_url: Option<&str>,
    ) -> ClientResult<Message> {
        self.enter("send_message")?;
        let mut state = self.state.lock();
        state.next_id += 1;
        let mut stored = message(
            &format!("sent-{}", state.next_id),
            chat_id,
            sender_id,
            content,
            100 + state.next_id as i64,
        );
        stored.file_url = file_url.map(String::from);
        state.sent.push(SentMessage {
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            file_url: stored.file_url.clone(),
        });
        state
            .messages
            .entry(chat_id.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn fetch_all_users(&self, exclude_id: &str) -> ClientResult<Vec<User>> {
        self.enter("fetch_all_users")?;
        let mut users: Vec<User> = self
            .state
            .lock()
            .users
            .values()
            .filter(|u| u.id != exclude_id)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn fetch_user(&self, user_id: &str) -> ClientResult<User> {
        self.enter("fetch_user")?;
        self.state
            .lock()
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| ClientError::not_found("User", user_id))
    }

    async fn create_group_chat(&self, name: &str, member_ids: &[String], creator_id: &str) -> ClientResult<Chat> {
        self.enter("create_group_chat")?;
        let mut state = self.state.lock();
        state.next_id += 1;
        let mut chat = Chat::new(format!("group-{}", state.next_id));
        chat.name = Some(name.to_string());
        chat.is_group = true;
        chat.members = std::iter::once(creator_id.to_string())
            .chain(member_ids.iter().cloned())
            .map(|id| state.users.get(&id).cloned().unwrap_or_else(|| User::placeholder(&id)))
            .collect();
        state.chats.insert(0, chat.clone());
        Ok(chat)
    }

    async fn create_direct_chat(&self, user_a: &str, user_b: &str) -> ClientResult<Chat> {
        self.enter("create_direct_chat")?;
        let mut state = self.state.lock();
        let existing = state.chats.iter().find(|c| {
            !c.is_group && c.member(user_a).is_some() && c.member(user_b).is_some()
        });
        if let Some(chat) = existing {
            return Ok(chat.clone());
        }

        state.next_id += 1;
        let mut chat = Chat::new(format!("direct-{}", state.next_id));
        chat.members = [user_a, user_b]
            .iter()
            .map(|id| state.users.get(*id).cloned().unwrap_or_else(|| User::placeholder(id)))
            .collect();
        state.chats.insert(0, chat.clone());
        Ok(chat)
    }

    async fn add_members(&self, chat_id: &str, user_ids: &[String]) -> ClientResult<()> {
        self.enter("add_members")?;
        let mut state = self.state.lock();
        let added: Vec<User> = user_ids
            .iter()
            .map(|id| state.users.get(id).cloned().unwrap_or_else(|| User::placeholder(id)))
            .collect();
        if let Some(chat) = state.chats.iter_mut().find(|c| c.id == chat_id) {
            chat.members.extend(added);
        }
        Ok(())
    }

    async fn delete_chat(&self, chat_id: &str) -> ClientResult<()> {
        self.enter("delete_chat")?;
        self.state.lock().chats.retain(|c| c.id != chat_id);
        Ok(())
    }

    async fn leave_chat(&self, chat_id: &str, _user_id: &str) -> ClientResult<()> {
        self.enter("leave_chat")?;
        self.state.lock().chats.retain(|c| c.id != chat_id);
        Ok(())
    }

    async fn add_label(&self, chat_id: &str, name: &str) -> ClientResult<Label> {
        self.enter("add_label")?;
        let label = Label::new(name).with_id(format!("label-{}", name.to_lowercase()));
        if let Some(chat) = self.state.lock().chats.iter_mut().find(|c| c.id == chat_id) {
            chat.labels.push(label.clone());
        }
        Ok(label)
    }

    async fn remove_label(&self, chat_id: &str, label: &Label) -> ClientResult<()> {
        self.enter("remove_label")?;
        if let Some(chat) = self.state.lock().chats.iter_mut().find(|c| c.id == chat_id) {
            chat.labels.retain(|l| l.name != label.name);
        }
        Ok(())
    }

    async fn upload_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> ClientResult<String> {
        self.enter("upload_object")?;
        self.state
            .lock()
            .uploads
            .push((path.to_string(), bytes.len(), content_type.to_string()));
        Ok(format!("https://cdn.test/{}", path))
    }

    async fn update_full_name(&self, user_id: &str, full_name: &str) -> ClientResult<()> {
        self.enter("update_full_name")?;
        if let Some(user) = self.state.lock().users.get_mut(user_id) {
            user.full_name = Some(full_name.to_string());
        }
        Ok(())
    }
}
