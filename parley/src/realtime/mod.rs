//! Row-change subscriptions over the platform's realtime websocket.

mod change;
mod client;
mod messages;

pub use change::{ChangeEvent, ChangeFilter, ChangeKind};
pub use client::{ChangeSubscription, RealtimeClient};
pub use messages::PhoenixFrame;
