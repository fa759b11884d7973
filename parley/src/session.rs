//! Signed-in session state.
//!
//! [`AuthContext`] owns the current session, persists it between runs and
//! publishes every sign-in / sign-out to subscribers. It has an explicit
//! lifetime: [`AuthContext::init`] restores whatever was persisted and starts
//! a background task that refreshes the access token before it expires;
//! [`AuthContext::teardown`] stops both.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::api::auth::{AuthSession, SignUpOutcome};
use crate::api::Platform;
use crate::error::{ClientError, ClientResult};
use crate::models::input::{RegisterInput, SignInInput, ValidateExt};
use crate::models::User;

/// Published authentication state
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    SignedOut,
    SignedIn(User),
}

impl AuthState {
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::SignedIn(user) => Some(user),
            AuthState::SignedOut => None,
        }
    }
}

/// JSON file holding the persisted session
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persisted session, if the file exists and parses
    pub fn load(&self) -> Option<AuthSession> {
        if !self.path.exists() {
            return None;
        }

        let contents = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<AuthSession>(&contents) {
            Ok(session) if !session.access_token.trim().is_empty() => Some(session),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable session file");
                None
            }
        }
    }

    pub fn save(&self, session: &AuthSession) -> ClientResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let contents = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, contents)?;
        debug!(path = %self.path.display(), "Session saved");
        Ok(())
    }

    pub fn clear(&self) -> ClientResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Refresh this many seconds before the access token expires
const REFRESH_MARGIN_SECS: i64 = 60;
/// Retry delay after a refresh that never reached the platform
const REFRESH_RETRY: Duration = Duration::from_secs(30);

pub struct AuthContext {
    inner: Arc<AuthInner>,
    refresher: JoinHandle<()>,
}

struct AuthInner {
    platform: Platform,
    store: SessionStore,
    session: RwLock<Option<AuthSession>>,
    state_tx: watch::Sender<AuthState>,
    token_tx: watch::Sender<Option<String>>,
}

impl AuthContext {
    /// Restore the persisted session, if it is still good, and start
    /// refreshing the access token ahead of its expiry.
    ///
    /// An expired access token is refreshed; a session the platform no longer
    /// accepts is discarded and the context starts signed out.
    pub async fn init(platform: Platform, store: SessionStore) -> Self {
        let (state_tx, _) = watch::channel(AuthState::SignedOut);
        let (token_tx, _) = watch::channel(None);
        let inner = Arc::new(AuthInner {
            platform,
            store,
            session: RwLock::new(None),
            state_tx,
            token_tx,
        });

        if let Some(saved) = inner.store.load() {
            match inner.revalidate(saved).await {
                Ok(session) => {
                    if let Err(e) = inner.establish(session).await {
                        warn!(error = %e, "Could not restore session");
                    }
                }
                Err(e) => {
                    info!(error = %e, "Stored session no longer valid");
                    if let Err(e) = inner.store.clear() {
                        warn!(error = %e, "Failed to remove stale session file");
                    }
                }
            }
        }

        let refresher = tokio::spawn(refresh_loop(inner.clone()));
        Self { inner, refresher }
    }

    pub fn platform(&self) -> &Platform {
        &self.inner.platform
    }

    /// Watch auth state changes
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state_tx.subscribe()
    }

    /// Watch the access token; every refresh publishes the new one
    pub fn watch_token(&self) -> watch::Receiver<Option<String>> {
        self.inner.token_tx.subscribe()
    }

    pub fn state(&self) -> AuthState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state().user().cloned()
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.inner.session.read().clone()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ClientResult<User> {
        let input = SignInInput {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        input.validate_input()?;

        let session = self
            .inner
            .platform
            .sign_in_with_password(&input.email, &input.password)
            .await?;
        self.inner.establish(session).await
    }

    pub async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> ClientResult<SignUpOutcome> {
        let input = RegisterInput {
            email: email.trim().to_string(),
            password: password.to_string(),
            full_name: full_name.trim().to_string(),
        };
        input.validate_input()?;

        let outcome = self
            .inner
            .platform
            .sign_up(&input.email, &input.password, &input.full_name)
            .await?;
        if let SignUpOutcome::SignedIn(session) = &outcome {
            self.inner.establish(session.clone()).await?;
        }
        Ok(outcome)
    }

    /// Exchange the refresh token for a new access token now.
    ///
    /// Returns `None` when signed out.
    pub async fn refresh(&self) -> ClientResult<Option<User>> {
        self.inner.refresh().await
    }

    /// End the session locally and on the platform
    pub async fn sign_out(&self) -> ClientResult<()> {
        let session = self.inner.session.read().clone();
        if let Some(session) = session {
            if let Err(e) = self.inner.platform.sign_out_remote(&session.access_token).await {
                warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
            }
        }

        self.inner.clear_local()?;
        info!("Signed out");
        Ok(())
    }

    /// Stop refreshing and publishing; subscribers see their channels close
    pub fn teardown(self) {
        debug!(
            subscribers = self.inner.state_tx.receiver_count(),
            "Auth context torn down"
        );
    }
}

impl Drop for AuthContext {
    fn drop(&mut self) {
        self.refresher.abort();
    }
}

impl AuthInner {
    async fn revalidate(&self, saved: AuthSession) -> ClientResult<AuthSession> {
        if saved.is_expired() {
            debug!("Stored access token expired, refreshing");
            return self.platform.refresh_session(&saved.refresh_token).await;
        }

        match self.platform.get_auth_user(&saved.access_token).await {
            Ok(user) => Ok(AuthSession { user, ..saved }),
            Err(e) => {
                debug!(error = %e, "Stored access token rejected, refreshing");
                self.platform.refresh_session(&saved.refresh_token).await
            }
        }
    }

    async fn refresh(&self) -> ClientResult<Option<User>> {
        let refresh_token = self.session.read().as_ref().map(|s| s.refresh_token.clone());
        let Some(refresh_token) = refresh_token else {
            return Ok(None);
        };

        let session = self.platform.refresh_session(&refresh_token).await?;
        debug!("Access token refreshed");
        self.establish(session).await.map(Some)
    }

    /// When the current token should be refreshed, if it expires at all
    fn refresh_due(&self) -> Option<Instant> {
        let expires_at = self.session.read().as_ref()?.expires_at?;
        let secs = (expires_at - REFRESH_MARGIN_SECS - Utc::now().timestamp()).max(0);
        Some(Instant::now() + Duration::from_secs(secs as u64))
    }

    async fn establish(&self, session: AuthSession) -> ClientResult<User> {
        if session.access_token.trim().is_empty() {
            return Err(ClientError::auth("Platform returned an empty access token"));
        }

        self.platform.set_access_token(Some(session.access_token.clone()));
        if let Err(e) = self.store.save(&session) {
            warn!(error = %e, path = %self.store.path().display(), "Failed to persist session");
        }

        let profile = session.user.to_profile();
        if let Err(e) = self.platform.upsert_user(&profile).await {
            error!(user_id = %profile.id, error = %e, "Failed to upsert user profile");
        }

        let token = session.access_token.clone();
        *self.session.write() = Some(session);
        self.state_tx.send_replace(AuthState::SignedIn(profile.clone()));
        self.token_tx.send_replace(Some(token));
        info!(user_id = %profile.id, "Session established");
        Ok(profile)
    }

    fn clear_local(&self) -> ClientResult<()> {
        *self.session.write() = None;
        self.platform.set_access_token(None);
        let cleared = self.store.clear();
        self.state_tx.send_replace(AuthState::SignedOut);
        self.token_tx.send_replace(None);
        cleared
    }
}

/// Keep the access token fresh until the context is dropped
async fn refresh_loop(inner: Arc<AuthInner>) {
    let mut tokens = inner.token_tx.subscribe();
    let mut retry_at: Option<Instant> = None;

    loop {
        let Some(wake) = retry_at.or_else(|| inner.refresh_due()) else {
            if tokens.changed().await.is_err() {
                return;
            }
            continue;
        };

        tokio::select! {
            changed = tokens.changed() => {
                if changed.is_err() {
                    return;
                }
                retry_at = None;
            }
            _ = tokio::time::sleep_until(wake) => {
                retry_at = match inner.refresh().await {
                    Ok(_) => None,
                    Err(ClientError::Http(e)) => {
                        warn!(error = %e, "Token refresh failed, retrying");
                        Some(Instant::now() + REFRESH_RETRY)
                    }
                    Err(e) => {
                        warn!(error = %e, "Session could not be refreshed, signing out");
                        if let Err(e) = inner.clear_local() {
                            warn!(error = %e, "Failed to remove session file");
                        }
                        None
                    }
                };
            }
        }
    }
}
