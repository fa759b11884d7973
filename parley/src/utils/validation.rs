//! Input validation constants and utilities
//!
//! Most field validation is handled by garde in models/input.rs; these
//! functions back its custom validators.

use std::sync::LazyLock;

use regex::Regex;

pub const MAX_MESSAGE_LENGTH: usize = 10000;
pub const MAX_LABEL_LENGTH: usize = 50;
pub const MAX_GROUP_NAME_LENGTH: usize = 100;
pub const MAX_FULL_NAME_LENGTH: usize = 100;

/// Registration password rules, in the order they are shown to the user
pub static PASSWORD_REQUIREMENTS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r".{8,}", "At least 8 characters"),
        (r"[A-Z]", "One uppercase letter"),
        (r"[a-z]", "One lowercase letter"),
        (r"[0-9]", "One number"),
        (r"[^A-Za-z0-9]", "One special character"),
    ]
    .into_iter()
    .filter_map(|(pattern, label)| Regex::new(pattern).ok().map(|re| (re, label)))
    .collect()
});

/// Labels of every password rule the candidate fails
pub fn unmet_password_requirements(password: &str) -> Vec<&'static str> {
    PASSWORD_REQUIREMENTS
        .iter()
        .filter(|(re, _)| !re.is_match(password))
        .map(|(_, label)| *label)
        .collect()
}

/// Message text must contain something other than whitespace
pub fn validate_message_content(content: &str) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("Message cannot be empty".to_string());
    }
    if content.len() > MAX_MESSAGE_LENGTH {
        return Err(format!(
            "Message too long (max {} characters)",
            MAX_MESSAGE_LENGTH
        ));
    }
    Ok(())
}

/// Validate a label name on its own
pub fn validate_label_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Label cannot be empty".to_string());
    }
    if name.len() > MAX_LABEL_LENGTH {
        return Err(format!("Label too long (max {} characters)", MAX_LABEL_LENGTH));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err("Label contains invalid characters".to_string());
    }
    Ok(())
}
