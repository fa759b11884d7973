use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::Platform;
use crate::error::{ClientError, ClientResult};
use crate::models::{Chat, Message, User};

const CHAT_COLUMNS: &str = "chat_id,
    chats:chat_id (
        id, name, is_group, created_at,
        chat_labels ( id, label_id, labels ( id, name, color ) )
    )";

const MEMBER_COLUMNS: &str = "chat_id, user_id, users:user_id ( id, email, full_name, avatar_url )";

#[derive(Debug, Deserialize)]
struct MembershipRow {
    chat_id: String,
    #[serde(default)]
    chats: Option<Chat>,
}

#[derive(Debug, Deserialize)]
struct MemberUserRow {
    chat_id: String,
    #[serde(default)]
    users: Option<User>,
}

#[derive(Debug, Deserialize)]
struct ChatIdRow {
    chat_id: String,
}

impl Platform {
    /// Chats the user belongs to, with labels, members and latest message
    pub async fn fetch_user_chats(&self, user_id: &str) -> ClientResult<Vec<Chat>> {
        let memberships: Vec<MembershipRow> = self
            .from("chat_members")
            .select(CHAT_COLUMNS)
            .eq("user_id", user_id)
            .fetch()
            .await?;

        let chat_ids: Vec<String> = memberships.iter().map(|m| m.chat_id.clone()).collect();
        if chat_ids.is_empty() {
            return Ok(Vec::new());
        }

        let members: Vec<MemberUserRow> = self
            .from("chat_members")
            .select(MEMBER_COLUMNS)
            .is_in("chat_id", &chat_ids)
            .fetch()
            .await?;

        let latest: Vec<Message> = self
            .from("messages")
            .select("*")
            .is_in("chat_id", &chat_ids)
            .order("created_at", false)
            .fetch()
            .await?;

        let mut members_by_chat: HashMap<String, Vec<User>> = HashMap::new();
        for row in members {
            if let Some(user) = row.users {
                members_by_chat.entry(row.chat_id).or_default().push(user);
            }
        }

        // Rows arrive newest first, so the first one seen per chat wins
        let mut latest_by_chat: HashMap<String, Message> = HashMap::new();
        for msg in latest {
            latest_by_chat.entry(msg.chat_id.clone()).or_insert(msg);
        }

        let chats: Vec<Chat> = memberships
            .into_iter()
            .filter_map(|m| m.chats)
            .map(|mut chat| {
                chat.members = members_by_chat.remove(&chat.id).unwrap_or_default();
                chat.messages = latest_by_chat.remove(&chat.id).into_iter().collect();
                chat
            })
            .collect();

        debug!(user_id, count = chats.len(), "Fetched chats");
        Ok(chats)
    }

    /// Fails with `AccessDenied` unless the user is a member of the chat
    pub async fn ensure_membership(&self, chat_id: &str, user_id: &str) -> ClientResult<()> {
        let row: Option<ChatIdRow> = self
            .from("chat_members")
            .select("chat_id")
            .eq("chat_id", chat_id)
            .eq("user_id", user_id)
            .maybe_single()
            .await?;

        match row {
            Some(_) => Ok(()),
            None => Err(ClientError::access_denied(chat_id)),
        }
    }

    /// Member users of a chat keyed by id
    pub async fn fetch_users_for_chat(&self, chat_id: &str) -> ClientResult<HashMap<String, User>> {
        let rows: Vec<MemberUserRow> = self
            .from("chat_members")
            .select(MEMBER_COLUMNS)
            .eq("chat_id", chat_id)
            .fetch()
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.users)
            .map(|user| (user.id.clone(), user))
            .collect())
    }

    pub async fn create_group_chat(
        &self,
        name: &str,
        member_ids: &[String],
        creator_id: &str,
    ) -> ClientResult<Chat> {
        let chat: Chat = self
            .from("chats")
            .insert(&json!([{ "name": name, "is_group": true, "created_by": creator_id }]))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::remote(500, "chat insert returned no row"))?;

        let mut ids: Vec<&str> = member_ids.iter().map(String::as_str).collect();
        if !ids.contains(&creator_id) {
            ids.push(creator_id);
        }
        let members: Vec<_> = ids
            .iter()
            .map(|id| {
                let role = if *id == creator_id { "admin" } else { "member" };
                json!({
                    "chat_id": chat.id,
                    "user_id": id,
                    "role": role,
                    "assigned_by": creator_id,
                })
            })
            .collect();
        self.from("chat_members").insert_only(&json!(members)).await?;

        info!(chat_id = %chat.id, members = ids.len(), "Created group chat");
        Ok(chat)
    }

    /// Existing one-to-one chat between the two users, or a new one
    pub async fn create_direct_chat(&self, user_a: &str, user_b: &str) -> ClientResult<Chat> {
        let of_a = self.member_chat_ids(user_a).await?;
        let of_b = self.member_chat_ids(user_b).await?;
        let shared: Vec<String> = of_a.intersection(&of_b).cloned().collect();

        if !shared.is_empty() {
            let existing: Option<Chat> = self
                .from("chats")
                .select("*")
                .eq("is_group", "false")
                .is_in("id", &shared)
                .maybe_single()
                .await?;
            if let Some(chat) = existing {
                debug!(chat_id = %chat.id, "Reusing direct chat");
                return Ok(chat);
            }
        }

        let chat: Chat = self
            .from("chats")
            .insert(&json!([{ "is_group": false }]))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::remote(500, "chat insert returned no row"))?;

        let members: Vec<_> = [user_a, user_b]
            .iter()
            .map(|id| {
                json!({
                    "chat_id": chat.id,
                    "user_id": id,
                    "role": "member",
                    "assigned_by": user_a,
                })
            })
            .collect();
        self.from("chat_members").insert_only(&json!(members)).await?;

        info!(chat_id = %chat.id, "Created direct chat");
        Ok(chat)
    }

    async fn member_chat_ids(&self, user_id: &str) -> ClientResult<HashSet<String>> {
        let rows: Vec<ChatIdRow> = self
            .from("chat_members")
            .select("chat_id")
            .eq("user_id", user_id)
            .fetch()
            .await?;
        Ok(rows.into_iter().map(|r| r.chat_id).collect())
    }

    pub async fn add_members(&self, chat_id: &str, user_ids: &[String]) -> ClientResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let rows: Vec<_> = user_ids
            .iter()
            .map(|id| json!({ "chat_id": chat_id, "user_id": id, "role": "member", "joined_at": now }))
            .collect();
        self.from("chat_members").insert_only(&json!(rows)).await
    }

    /// Remove a direct chat for both members
    pub async fn delete_chat(&self, chat_id: &str) -> ClientResult<()> {
        self.from("chat_members").eq("chat_id", chat_id).delete().await?;
        self.from("chats").eq("id", chat_id).delete().await?;
        info!(chat_id, "Deleted chat");
        Ok(())
    }

    /// Drop the user's own membership of a group
    pub async fn leave_chat(&self, chat_id: &str, user_id: &str) -> ClientResult<()> {
        self.from("chat_members")
            .eq("chat_id", chat_id)
            .eq("user_id", user_id)
            .delete()
            .await?;
        info!(chat_id, user_id, "Left chat");
        Ok(())
    }
}
