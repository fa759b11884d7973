//! Client-side chat state and its synchronization with the platform.

mod driver;
pub mod merge;
mod mutation;
mod notify;
mod store;

pub use driver::{ChatRow, Intent, StoreView, SyncDriver, SyncHandle};
pub use mutation::{LabelChange, LabelMutation, MutationState};
pub use notify::{Notification, NotificationLevel, Notifier};
pub use store::{ChangeScope, ChatStore, Loading};
