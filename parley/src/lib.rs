//! Parley chat client library
//!
//! Everything the terminal front end needs: remote data access, the auth
//! session, realtime subscriptions and the synchronized chat state. Exposed
//! as a library so integration tests can drive it directly.

pub mod api;
pub mod audio;
pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod realtime;
pub mod session;
pub mod sync;
pub mod utils;

pub use api::Platform;
pub use backend::ChatBackend;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use session::{AuthContext, AuthState, SessionStore};
