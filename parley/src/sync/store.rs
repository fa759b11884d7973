use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::merge::{append_unique, bump_chat, filter_chats, local_sender, normalize_sender};
use super::mutation::{LabelChange, LabelMutation, MutationState};
use super::notify::Notifier;
use crate::audio::AudioClip;
use crate::backend::ChatBackend;
use crate::error::ClientResult;
use crate::models::input::{CreateGroupInput, LabelInput, SendMessageInput, ValidateExt};
use crate::models::{Chat, DisplayTarget, Label, Message, User};
use crate::realtime::{ChangeEvent, ChangeKind};
use crate::utils::{object_name, storage_path, AttachmentKind};

/// In-flight operations, for spinners and disabled buttons
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Loading {
    pub chats: bool,
    pub messages: bool,
    pub uploading: bool,
    pub labels: bool,
    pub group: bool,
    pub refreshing: bool,
}

/// Which subscription a change arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeScope {
    /// Inserts into `messages` for every chat
    AllMessages,
    /// Inserts into `messages` for the open chat only
    OpenChat,
    /// Any change to `messages`, used to keep the chat list fresh
    ChatList,
}

/// Client-side chat state: the chat list, the open chat, and the per-chat
/// message cache, kept in step with the platform.
///
/// Handlers take `&mut self` and run to completion, so a fetch started for a
/// chat that is no longer open never replaces what is on screen.
pub struct ChatStore {
    backend: Arc<dyn ChatBackend>,
    notifier: Notifier,
    me: User,
    chats: Vec<Chat>,
    selected: Option<String>,
    visible: Vec<Message>,
    message_cache: HashMap<String, Vec<Message>>,
    user_cache: HashMap<String, User>,
    directory: Vec<User>,
    filter: String,
    loading: Loading,
}

impl ChatStore {
    pub fn new(backend: Arc<dyn ChatBackend>, me: User, notifier: Notifier) -> Self {
        let mut user_cache = HashMap::new();
        user_cache.insert(me.id.clone(), me.clone());
        Self {
            backend,
            notifier,
            me,
            chats: Vec::new(),
            selected: None,
            visible: Vec::new(),
            message_cache: HashMap::new(),
            user_cache,
            directory: Vec::new(),
            filter: String::new(),
            loading: Loading::default(),
        }
    }

    pub fn current_user(&self) -> &User {
        &self.me
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn chat(&self, chat_id: &str) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == chat_id)
    }

    pub fn selected_chat_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_chat(&self) -> Option<&Chat> {
        self.selected.as_deref().and_then(|id| self.chat(id))
    }

    /// Messages of the open chat, oldest first
    pub fn visible_messages(&self) -> &[Message] {
        &self.visible
    }

    pub fn cached_messages(&self, chat_id: &str) -> Option<&[Message]> {
        self.message_cache.get(chat_id).map(Vec::as_slice)
    }

    pub fn cached_user(&self, user_id: &str) -> Option<&User> {
        self.user_cache.get(user_id)
    }

    /// Users offered when creating groups or chats
    pub fn directory(&self) -> &[User] {
        &self.directory
    }

    pub fn loading(&self) -> Loading {
        self.loading
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn set_filter(&mut self, query: &str) {
        self.filter = query.to_string();
    }

    /// Chats matching the current filter, in list order
    pub fn filtered_chats(&self) -> Vec<&Chat> {
        filter_chats(&self.chats, &self.filter, &self.me.id)
    }

    pub fn chat_title(&self, chat: &Chat) -> String {
        DisplayTarget::Chat {
            chat,
            viewer_id: &self.me.id,
        }
        .display_name()
    }

    pub fn user_name(&self, user: &User) -> String {
        DisplayTarget::User(user).display_name()
    }

    /// Initial load: chat list, user cache from every member, first chat opened
    pub async fn load_chats(&mut self) {
        self.loading.chats = true;
        let result = self.backend.fetch_user_chats(&self.me.id).await;
        self.loading.chats = false;

        match result {
            Ok(chats) => {
                info!(count = chats.len(), "Loaded chats");
                self.replace_chats(chats);
                if self.selected.is_none() {
                    if let Some(first) = self.chats.first().map(|c| c.id.clone()) {
                        self.select_chat(&first).await;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to load chats");
                self.notifier.error("Failed to load chats");
            }
        }
    }

    /// Open a chat, from cache when it has been opened before
    pub async fn select_chat(&mut self, chat_id: &str) {
        if self.chat(chat_id).is_none() {
            warn!(chat_id, "Ignoring selection of unknown chat");
            return;
        }
        self.selected = Some(chat_id.to_string());

        if let Some(cached) = self.message_cache.get(chat_id) {
            debug!(chat_id, count = cached.len(), "Serving messages from cache");
            self.visible = cached.clone();
            self.loading.messages = false;
            return;
        }

        self.visible.clear();
        self.loading.messages = true;
        let result = self.fetch_messages(chat_id).await;
        self.loading.messages = false;

        if let Err(e) = result {
            error!(chat_id, error = %e, "Failed to load messages");
            self.notifier.error("Failed to load messages");
        }
    }

    /// Close the open chat
    pub fn deselect(&mut self) {
        self.selected = None;
        self.visible.clear();
    }

    /// Fetch a chat's messages into the cache, and onto the screen if it is
    /// still the open chat
    async fn fetch_messages(&mut self, chat_id: &str) -> ClientResult<()> {
        let messages: Vec<Message> = self
            .backend
            .fetch_chat_messages(chat_id, &self.me.id)
            .await?
            .into_iter()
            .map(normalize_sender)
            .collect();

        debug!(chat_id, count = messages.len(), "Fetched messages");
        if self.selected.as_deref() == Some(chat_id) {
            self.visible = messages.clone();
        }
        self.message_cache.insert(chat_id.to_string(), messages);
        Ok(())
    }

    /// Sender for a pushed message: user cache, open chat's members, a remote
    /// lookup (cached), then a placeholder
    pub async fn resolve_sender(&mut self, sender_id: &str) -> User {
        if let Some(user) = local_sender(&self.user_cache, self.selected_chat(), sender_id) {
            return user;
        }

        match self.backend.fetch_user(sender_id).await {
            Ok(user) => {
                self.user_cache.insert(user.id.clone(), user.clone());
                user
            }
            Err(e) => {
                debug!(sender_id, error = %e, "Sender lookup failed, using placeholder");
                User::placeholder(sender_id)
            }
        }
    }

    /// Merge a message pushed for any chat
    pub async fn apply_insert(&mut self, message: Message) {
        if message.chat_id.is_empty() {
            debug!(message_id = %message.id, "Ignoring pushed message without chat");
            return;
        }

        let sender = self.resolve_sender(&message.sender_id).await;
        let message = message.with_sender(sender);
        let chat_id = message.chat_id.clone();

        if let Some(cached) = self.message_cache.get_mut(&chat_id) {
            append_unique(cached, message.clone());
        }
        if self.selected.as_deref() == Some(chat_id.as_str()) {
            append_unique(&mut self.visible, message.clone());
        }
        if !bump_chat(&mut self.chats, &message) {
            debug!(chat_id = %chat_id, "Pushed message for a chat not in the list");
        }
    }

    /// Merge a row pushed on the open chat's own channel. Malformed rows are
    /// dropped.
    pub fn apply_open_chat_insert(&mut self, record: &Value) {
        let Some(message) = Message::from_record(record) else {
            debug!("Ignoring malformed message payload");
            return;
        };
        let Some(open) = self.selected.as_deref() else {
            return;
        };
        if !message.chat_id.is_empty() && message.chat_id != open {
            debug!(chat_id = %message.chat_id, "Pushed message for a chat that is no longer open");
            return;
        }

        let message = match local_sender(&self.user_cache, self.selected_chat(), &message.sender_id) {
            Some(sender) => message.with_sender(sender),
            None => message,
        };
        append_unique(&mut self.visible, message);
    }

    /// Route a delivered change to the matching merge
    pub async fn handle_change(&mut self, scope: ChangeScope, event: ChangeEvent) {
        match (scope, event.kind) {
            (ChangeScope::AllMessages, ChangeKind::Insert) => match Message::from_record(&event.record) {
                Some(message) => self.apply_insert(message).await,
                None => debug!("Ignoring malformed message payload"),
            },
            (ChangeScope::OpenChat, ChangeKind::Insert) => self.apply_open_chat_insert(&event.record),
            // Inserts are already merged above
            (ChangeScope::ChatList, ChangeKind::Update | ChangeKind::Delete) => {
                self.reload_chat_list().await;
            }
            _ => {}
        }
    }

    async fn reload_chat_list(&mut self) {
        match self.backend.fetch_user_chats(&self.me.id).await {
            Ok(chats) => self.replace_chats(chats),
            Err(e) => warn!(error = %e, "Background chat list refresh failed"),
        }
    }

    /// Install a fetched chat list. An open chat missing from it is closed
    /// and its cache dropped.
    fn replace_chats(&mut self, chats: Vec<Chat>) {
        for member in chats.iter().flat_map(|c| c.members.iter()) {
            self.user_cache.insert(member.id.clone(), member.clone());
        }
        self.chats = chats;

        if let Some(chat_id) = self.selected.clone() {
            if self.chat(&chat_id).is_none() {
                info!(chat_id = %chat_id, "Open chat no longer listed, closing it");
                self.message_cache.remove(&chat_id);
                self.deselect();
            }
        }
    }

    /// Send text to the open chat. Blank text never reaches the platform;
    /// the stored message comes back through realtime.
    pub async fn send_text(&mut self, text: &str) -> Option<Message> {
        let chat_id = self.selected.clone()?;
        let input = SendMessageInput {
            chat_id,
            content: text.to_string(),
        };
        if let Err(e) = input.validate_input() {
            debug!(reason = %e, "Message rejected");
            return None;
        }

        match self
            .backend
            .send_message(&input.chat_id, &self.me.id, input.content.trim(), None)
            .await
        {
            Ok(message) => Some(message),
            Err(e) => {
                error!(chat_id = %input.chat_id, error = %e, "Failed to send message");
                self.notifier.error("Failed to send message");
                None
            }
        }
    }

    pub async fn upload_file(&mut self, file_name: &str, bytes: Vec<u8>, content_type: &str) -> bool {
        self.upload(AttachmentKind::File, file_name, bytes, content_type).await
    }

    pub async fn upload_image(&mut self, file_name: &str, bytes: Vec<u8>, content_type: &str) -> bool {
        self.upload(AttachmentKind::Image, file_name, bytes, content_type).await
    }

    pub async fn upload_audio(&mut self, clip: AudioClip) -> bool {
        if self.selected.is_none() {
            self.notifier.error("No audio recorded");
            return false;
        }
        if clip.is_empty() {
            self.notifier.error("Audio recording is empty");
            return false;
        }
        self.upload(AttachmentKind::Audio, &clip.file_name, clip.bytes, clip.mime)
            .await
    }

    async fn upload(&mut self, kind: AttachmentKind, file_name: &str, bytes: Vec<u8>, content_type: &str) -> bool {
        let Some(chat_id) = self.selected.clone() else {
            warn!(kind = kind.noun(), "Upload without an open chat");
            return false;
        };

        self.loading.uploading = true;
        let result = self
            .upload_and_announce(&chat_id, kind, file_name, bytes, content_type)
            .await;
        self.loading.uploading = false;

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(chat_id = %chat_id, kind = kind.noun(), error = %e, "Upload failed");
                self.notifier.error(format!("Failed to upload {}", kind.noun()));
                false
            }
        }
    }

    async fn upload_and_announce(
        &mut self,
        chat_id: &str,
        kind: AttachmentKind,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> ClientResult<()> {
        let name = object_name(file_name);
        let path = storage_path(&self.me.id, chat_id, kind, &name);
        let url = self.backend.upload_object(&path, bytes, content_type).await?;

        // Voice notes have no meaningful original name
        let caption = match kind {
            AttachmentKind::Audio => name.as_str(),
            _ => file_name,
        };
        let content = format!("{} {}", kind.tag(), caption);
        self.backend
            .send_message(chat_id, &self.me.id, &content, Some(&url))
            .await?;

        self.fetch_messages(chat_id).await
    }

    /// Show the label immediately; settle with [`commit_label`](Self::commit_label)
    pub fn stage_label_add(&mut self, chat_id: &str, name: &str) -> Option<LabelMutation> {
        let name = name.trim();
        let Some(chat) = self.chats.iter_mut().find(|c| c.id == chat_id) else {
            warn!(chat_id, "Label edit on unknown chat");
            return None;
        };
        let input = LabelInput {
            chat_id: chat_id.to_string(),
            name: name.to_string(),
        };
        if let Err(reason) = input.check_against(chat) {
            self.notifier.error(reason);
            return None;
        }
        Some(LabelMutation::add(chat, Label::new(input.name)))
    }

    /// Hide the label immediately; settle with [`commit_label`](Self::commit_label)
    pub fn stage_label_remove(&mut self, chat_id: &str, name: &str) -> Option<LabelMutation> {
        let chat = self.chats.iter_mut().find(|c| c.id == chat_id)?;
        LabelMutation::remove(chat, name)
    }

    /// Issue the remote update for a staged label edit and settle it
    pub async fn commit_label(&mut self, mut mutation: LabelMutation) -> MutationState {
        self.loading.labels = true;
        let result = match mutation.change() {
            LabelChange::Add(label) => self
                .backend
                .add_label(mutation.chat_id(), &label.name)
                .await
                .map(Some),
            LabelChange::Remove(label) => self
                .backend
                .remove_label(mutation.chat_id(), label)
                .await
                .map(|()| None),
        };
        self.loading.labels = false;

        let chat_id = mutation.chat_id().to_string();
        let chat = self.chats.iter_mut().find(|c| c.id == chat_id);
        match result {
            Ok(stored) => mutation.confirm(chat, stored),
            Err(e) => {
                mutation.revert(chat);
                error!(chat_id = %chat_id, error = %e, "Label update failed, reverted");
                let text = match mutation.change() {
                    LabelChange::Add(_) => "Failed to add label",
                    LabelChange::Remove(_) => "Failed to remove label",
                };
                self.notifier.error(text);
            }
        }
        mutation.state()
    }

    pub async fn add_label(&mut self, chat_id: &str, name: &str) -> Option<MutationState> {
        let mutation = self.stage_label_add(chat_id, name)?;
        Some(self.commit_label(mutation).await)
    }

    pub async fn remove_label(&mut self, chat_id: &str, name: &str) -> Option<MutationState> {
        let mutation = self.stage_label_remove(chat_id, name)?;
        Some(self.commit_label(mutation).await)
    }

    /// Load everyone else, for member pickers
    pub async fn load_directory(&mut self) {
        match self.backend.fetch_all_users(&self.me.id).await {
            Ok(users) => self.directory = users,
            Err(e) => {
                error!(error = %e, "Failed to load users");
                self.notifier.error("Failed to load users");
            }
        }
    }

    pub async fn create_group(&mut self, name: &str, member_ids: Vec<String>) -> Option<Chat> {
        let input = CreateGroupInput {
            name: name.trim().to_string(),
            member_ids,
        };
        if input.validate_input().is_err() {
            self.notifier.error("Enter group name and select members");
            return None;
        }

        self.loading.group = true;
        let result = self.create_group_and_reload(&input).await;
        self.loading.group = false;

        match result {
            Ok(chat) => {
                self.notifier.success("Group created!");
                Some(chat)
            }
            Err(e) => {
                error!(error = %e, "Failed to create group");
                self.notifier.error("Failed to create group");
                None
            }
        }
    }

    async fn create_group_and_reload(&mut self, input: &CreateGroupInput) -> ClientResult<Chat> {
        let chat = self
            .backend
            .create_group_chat(&input.name, &input.member_ids, &self.me.id)
            .await?;
        let chats = self.backend.fetch_user_chats(&self.me.id).await?;
        self.replace_chats(chats);
        Ok(chat)
    }

    /// Open the one-to-one chat with `user_id`, creating it if needed
    pub async fn start_direct_chat(&mut self, user_id: &str) -> Option<String> {
        let result = async {
            let chat = self.backend.create_direct_chat(&self.me.id, user_id).await?;
            let chats = self.backend.fetch_user_chats(&self.me.id).await?;
            ClientResult::Ok((chat, chats))
        }
        .await;

        match result {
            Ok((chat, chats)) => {
                self.replace_chats(chats);
                self.select_chat(&chat.id).await;
                Some(chat.id)
            }
            Err(e) => {
                error!(user_id, error = %e, "Failed to start chat");
                self.notifier.error("Failed to start chat");
                None
            }
        }
    }

    /// Add people to the open group chat
    pub async fn add_members(&mut self, member_ids: Vec<String>) -> bool {
        let Some(chat) = self.selected_chat() else {
            return false;
        };
        if !chat.is_group || member_ids.is_empty() {
            return false;
        }
        let chat_id = chat.id.clone();

        let result = async {
            self.backend.add_members(&chat_id, &member_ids).await?;
            self.backend.fetch_user_chats(&self.me.id).await
        }
        .await;

        match result {
            Ok(chats) => {
                self.replace_chats(chats);
                self.notifier.success("Members added successfully");
                true
            }
            Err(e) => {
                error!(chat_id = %chat_id, error = %e, "Failed to add members");
                self.notifier.error("Failed to add members");
                false
            }
        }
    }

    /// Delete a direct chat, or leave a group
    pub async fn delete_chat(&mut self, chat_id: &str) -> bool {
        let Some(is_group) = self.chat(chat_id).map(|c| c.is_group) else {
            return false;
        };

        let result = if is_group {
            self.backend.leave_chat(chat_id, &self.me.id).await
        } else {
            self.backend.delete_chat(chat_id).await
        };

        match result {
            Ok(()) => {
                self.forget_chat(chat_id);
                self.notifier.success(if is_group {
                    "Left group successfully"
                } else {
                    "Chat deleted successfully"
                });
                true
            }
            Err(e) => {
                error!(chat_id, error = %e, "Failed to delete chat");
                self.notifier.error("Failed to delete chat");
                false
            }
        }
    }

    pub async fn leave_group(&mut self, chat_id: &str) -> bool {
        match self.backend.leave_chat(chat_id, &self.me.id).await {
            Ok(()) => {
                self.forget_chat(chat_id);
                self.notifier.success("Left group successfully");
                true
            }
            Err(e) => {
                error!(chat_id, error = %e, "Failed to leave group");
                self.notifier.error("Failed to leave group");
                false
            }
        }
    }

    fn forget_chat(&mut self, chat_id: &str) {
        self.chats.retain(|c| c.id != chat_id);
        self.message_cache.remove(chat_id);
        if self.selected.as_deref() == Some(chat_id) {
            self.deselect();
        }
    }

    /// Refetch the chat list and the open chat's messages
    pub async fn refresh(&mut self) {
        self.loading.refreshing = true;
        let result = self.refresh_inner().await;
        self.loading.refreshing = false;

        if let Err(e) = result {
            error!(error = %e, "Refresh failed");
            self.notifier.error("Failed to refresh");
        }
    }

    async fn refresh_inner(&mut self) -> ClientResult<()> {
        let chats = self.backend.fetch_user_chats(&self.me.id).await?;
        self.replace_chats(chats);

        let Some(chat_id) = self.selected.clone() else {
            return Ok(());
        };
        self.fetch_messages(&chat_id).await
    }

    /// Change the signed-in user's display name
    pub async fn rename_self(&mut self, full_name: &str) -> bool {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            self.notifier.error("Username cannot be empty");
            return false;
        }

        match self.backend.update_full_name(&self.me.id, full_name).await {
            Ok(()) => {
                self.me.full_name = Some(full_name.to_string());
                self.user_cache.insert(self.me.id.clone(), self.me.clone());
                self.notifier.success("Username updated!");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to update username");
                self.notifier.error("Failed to update username");
                false
            }
        }
    }
}
