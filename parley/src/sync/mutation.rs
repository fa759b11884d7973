//! Optimistic label edits that settle once the platform answers.

use crate::models::{Chat, Label};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Confirmed,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelChange {
    Add(Label),
    Remove(Label),
}

/// One label edit on one chat.
///
/// Created `Pending` with the change already visible on the chat, then either
/// confirmed with what the platform stored or reverted to the labels the chat
/// had before.
#[derive(Debug, Clone)]
pub struct LabelMutation {
    chat_id: String,
    change: LabelChange,
    previous: Vec<Label>,
    state: MutationState,
}

impl LabelMutation {
    /// Show `label` on the chat right away
    pub fn add(chat: &mut Chat, label: Label) -> Self {
        let previous = chat.labels.clone();
        chat.labels.push(label.clone());
        Self {
            chat_id: chat.id.clone(),
            change: LabelChange::Add(label),
            previous,
            state: MutationState::Pending,
        }
    }

    /// Hide the label called `name`; `None` if the chat does not carry it
    pub fn remove(chat: &mut Chat, name: &str) -> Option<Self> {
        let index = chat.labels.iter().position(|l| l.name == name)?;
        let previous = chat.labels.clone();
        let label = chat.labels.remove(index);
        Some(Self {
            chat_id: chat.id.clone(),
            change: LabelChange::Remove(label),
            previous,
            state: MutationState::Pending,
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn change(&self) -> &LabelChange {
        &self.change
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    /// Settle successfully. For an add, `stored` replaces the optimistic
    /// label so the chat carries the platform's id and color.
    pub fn confirm(&mut self, chat: Option<&mut Chat>, stored: Option<Label>) {
        if self.state != MutationState::Pending {
            return;
        }
        if let (LabelChange::Add(pending), Some(chat), Some(stored)) = (&self.change, chat, stored) {
            if let Some(slot) = chat.labels.iter_mut().find(|l| l.name == pending.name) {
                *slot = stored;
            }
        }
        self.state = MutationState::Confirmed;
    }

    /// Settle unsuccessfully, restoring the chat's prior labels
    pub fn revert(&mut self, chat: Option<&mut Chat>) {
        if self.state != MutationState::Pending {
            return;
        }
        if let Some(chat) = chat {
            chat.labels = self.previous.clone();
        }
        self.state = MutationState::Reverted;
    }
}
