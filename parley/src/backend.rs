//! The remote operations the chat state container depends on.
//!
//! [`Platform`] is the production implementation; tests drive the state
//! container with an in-memory double instead.

use async_trait::async_trait;

use crate::api::Platform;
use crate::error::ClientResult;
use crate::models::{Chat, Label, Message, User};

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn fetch_user_chats(&self, user_id: &str) -> ClientResult<Vec<Chat>>;

    async fn fetch_chat_messages(&self, chat_id: &str, user_id: &str) -> ClientResult<Vec<Message>>;

    async fn send_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: &str,
        file_url: Option<&str>,
    ) -> ClientResult<Message>;

    async fn fetch_all_users(&self, exclude_id: &str) -> ClientResult<Vec<User>>;

    async fn fetch_user(&self, user_id: &str) -> ClientResult<User>;

    async fn create_group_chat(
        &self,
        name: &str,
        member_ids: &[String],
        creator_id: &str,
    ) -> ClientResult<Chat>;

    async fn create_direct_chat(&self, user_a: &str, user_b: &str) -> ClientResult<Chat>;

    async fn add_members(&self, chat_id: &str, user_ids: &[String]) -> ClientResult<()>;

    async fn delete_chat(&self, chat_id: &str) -> ClientResult<()>;

    async fn leave_chat(&self, chat_id: &str, user_id: &str) -> ClientResult<()>;

    async fn add_label(&self, chat_id: &str, name: &str) -> ClientResult<Label>;

    /// Unlink a label; labels without an id are looked up by name
    async fn remove_label(&self, chat_id: &str, label: &Label) -> ClientResult<()>;

    /// Store bytes and return the public URL of the object
    async fn upload_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> ClientResult<String>;

    async fn update_full_name(&self, user_id: &str, full_name: &str) -> ClientResult<()>;
}

#[async_trait]
impl ChatBackend for Platform {
    async fn fetch_user_chats(&self, user_id: &str) -> ClientResult<Vec<Chat>> {
        Platform::fetch_user_chats(self, user_id).await
    }

    async fn fetch_chat_messages(&self, chat_id: &str, user_id: &str) -> ClientResult<Vec<Message>> {
        Platform::fetch_chat_messages(self, chat_id, user_id).await
    }

    async fn send_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: &str,
        file_url: Option<&str>,
    ) -> ClientResult<Message> {
        Platform::send_message(self, chat_id, sender_id, content, file_url).await
    }

    async fn fetch_all_users(&self, exclude_id: &str) -> ClientResult<Vec<User>> {
        Platform::fetch_all_users(self, exclude_id).await
    }

    async fn fetch_user(&self, user_id: &str) -> ClientResult<User> {
        Platform::fetch_user(self, user_id).await
    }

    async fn create_group_chat(
        &self,
        name: &str,
        member_ids: &[String],
        creator_id: &str,
    ) -> ClientResult<Chat> {
        Platform::create_group_chat(self, name, member_ids, creator_id).await
    }

    async fn create_direct_chat(&self, user_a: &str, user_b: &str) -> ClientResult<Chat> {
        Platform::create_direct_chat(self, user_a, user_b).await
    }

    async fn add_members(&self, chat_id: &str, user_ids: &[String]) -> ClientResult<()> {
        Platform::add_members(self, chat_id, user_ids).await
    }

    async fn delete_chat(&self, chat_id: &str) -> ClientResult<()> {
        Platform::delete_chat(self, chat_id).await
    }

    async fn leave_chat(&self, chat_id: &str, user_id: &str) -> ClientResult<()> {
        Platform::leave_chat(self, chat_id, user_id).await
    }

    async fn add_label(&self, chat_id: &str, name: &str) -> ClientResult<Label> {
        Platform::add_label(self, chat_id, name).await
    }

    async fn remove_label(&self, chat_id: &str, label: &Label) -> ClientResult<()> {
        let label_id = match &label.id {
            Some(id) => id.clone(),
            None => self.find_label_id(&label.name).await?,
        };
        Platform::remove_label(self, chat_id, &label_id).await
    }

    async fn upload_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> ClientResult<String> {
        Platform::upload_object(self, path, bytes, content_type).await
    }

    async fn update_full_name(&self, user_id: &str, full_name: &str) -> ClientResult<()> {
        Platform::update_full_name(self, user_id, full_name).await
    }
}
