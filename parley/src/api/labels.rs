use serde_json::json;
use tracing::{debug, info};

use super::Platform;
use crate::error::{ClientError, ClientResult};
use crate::models::{Label, DEFAULT_LABEL_COLOR};

impl Platform {
    /// Find or create the label by name and link it to the chat
    pub async fn add_label(&self, chat_id: &str, name: &str) -> ClientResult<Label> {
        let existing: Option<Label> = self
            .from("labels")
            .select("*")
            .eq("name", name)
            .maybe_single()
            .await?;

        let label = match existing {
            Some(label) => label,
            None => {
                debug!(name, "Creating label");
                self.from("labels")
                    .insert::<Label>(&json!([{ "name": name, "color": DEFAULT_LABEL_COLOR }]))
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| ClientError::remote(500, "label insert returned no row"))?
            }
        };

        let label_id = label
            .id
            .clone()
            .ok_or_else(|| ClientError::remote(500, "label row has no id"))?;

        self.from("chat_labels")
            .insert_only(&json!([{ "chat_id": chat_id, "label_id": label_id }]))
            .await?;

        info!(chat_id, label = %label.name, "Label added");
        Ok(label)
    }

    /// Id of the label called `name`
    pub async fn find_label_id(&self, name: &str) -> ClientResult<String> {
        let label: Option<Label> = self
            .from("labels")
            .select("id, name, color")
            .eq("name", name)
            .maybe_single()
            .await?;
        label
            .and_then(|l| l.id)
            .ok_or_else(|| ClientError::not_found("Label", name))
    }

    pub async fn remove_label(&self, chat_id: &str, label_id: &str) -> ClientResult<()> {
        self.from("chat_labels")
            .eq("chat_id", chat_id)
            .eq("label_id", label_id)
            .delete()
            .await?;
        info!(chat_id, label_id, "Label removed");
        Ok(())
    }
}
