use serde_json::json;

use super::Platform;
use crate::error::{ClientError, ClientResult};
use crate::models::User;

const USER_COLUMNS: &str = "id, email, full_name, avatar_url";

impl Platform {
    /// Everyone except `exclude_id`, for member pickers
    pub async fn fetch_all_users(&self, exclude_id: &str) -> ClientResult<Vec<User>> {
        self.from("users")
            .select(USER_COLUMNS)
            .neq("id", exclude_id)
            .fetch()
            .await
    }

    pub async fn fetch_user(&self, user_id: &str) -> ClientResult<User> {
        self.from("users")
            .select(USER_COLUMNS)
            .eq("id", user_id)
            .single()
            .await
            .map_err(|e| match e {
                ClientError::NotFound { .. } => ClientError::not_found("User", user_id),
                other => other,
            })
    }

    pub async fn upsert_user(&self, user: &User) -> ClientResult<()> {
        self.from("users").upsert(&json!(user)).await
    }

    pub async fn update_full_name(&self, user_id: &str, full_name: &str) -> ClientResult<()> {
        self.from("users")
            .eq("id", user_id)
            .update(&json!({ "full_name": full_name }))
            .await
    }
}
