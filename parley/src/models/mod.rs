mod chat;
pub mod display;
pub mod input;
mod label;
mod message;
mod user;

pub use chat::Chat;
pub use display::DisplayTarget;
pub use label::{Label, DEFAULT_LABEL_COLOR};
pub use message::{Message, MessageKind};
pub use user::User;
