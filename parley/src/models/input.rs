//! Input DTOs with garde validation for user intents.
//!
//! These structs validate front-end data before any remote call is made.

use garde::Validate;
use serde::Deserialize;

use super::chat::Chat;
use crate::error::{ClientError, ClientResult};
use crate::utils::validation::{
    unmet_password_requirements, validate_label_name, validate_message_content,
    MAX_FULL_NAME_LENGTH, MAX_GROUP_NAME_LENGTH,
};

const MAX_ID_LENGTH: usize = 256;

fn message_content(value: &str, _ctx: &()) -> garde::Result {
    validate_message_content(value).map_err(garde::Error::new)
}

fn label_name(value: &str, _ctx: &()) -> garde::Result {
    validate_label_name(value).map_err(garde::Error::new)
}

fn not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("cannot be empty"));
    }
    Ok(())
}

fn strong_password(value: &str, _ctx: &()) -> garde::Result {
    let unmet = unmet_password_requirements(value);
    if unmet.is_empty() {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "Password does not meet requirements: {}",
            unmet.join(", ")
        )))
    }
}

/// Input for sending a text message
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct SendMessageInput {
    #[garde(length(min = 1, max = MAX_ID_LENGTH))]
    pub chat_id: String,
    #[garde(custom(message_content))]
    pub content: String,
}

/// Input for creating a group chat
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct CreateGroupInput {
    #[garde(custom(not_blank), length(max = MAX_GROUP_NAME_LENGTH))]
    pub name: String,
    #[garde(length(min = 1), inner(length(min = 1, max = MAX_ID_LENGTH)))]
    pub member_ids: Vec<String>,
}

/// Input for attaching a label to a chat
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct LabelInput {
    #[garde(length(min = 1, max = MAX_ID_LENGTH))]
    pub chat_id: String,
    #[garde(custom(label_name))]
    pub name: String,
}

impl LabelInput {
    /// First reason the label cannot go on `chat`, worded for the user
    pub fn check_against(&self, chat: &Chat) -> Result<(), String> {
        if let Err(report) = self.validate() {
            return Err(report
                .iter()
                .next()
                .map(|(_, e)| e.message().to_string())
                .unwrap_or_else(|| "Invalid label".to_string()));
        }
        if chat.has_label(self.name.trim()) {
            return Err("Label already exists".to_string());
        }
        Ok(())
    }
}

/// Input for signing in
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct SignInInput {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 1))]
    pub password: String,
}

/// Input for creating an account
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct RegisterInput {
    #[garde(email)]
    pub email: String,
    #[garde(custom(strong_password))]
    pub password: String,
    #[garde(custom(not_blank), length(max = MAX_FULL_NAME_LENGTH))]
    pub full_name: String,
}

/// Helper trait to convert garde validation errors into client errors
pub trait ValidateExt {
    fn validate_input(&self) -> ClientResult<()>;
}

impl<T: Validate<Context = ()>> ValidateExt for T {
    fn validate_input(&self) -> ClientResult<()> {
        self.validate()
            .map_err(|e| ClientError::validation(e.to_string()))
    }
}
