//! Password authentication against the platform's auth service.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{read_error, Platform};
use crate::error::{ClientError, ClientResult};
use crate::models::User;

/// Account record as returned by the auth service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

impl AuthUser {
    /// Row for the `users` table: full name from metadata, else the email
    pub fn to_profile(&self) -> User {
        let email = self.email.clone().unwrap_or_default();
        let full_name = self
            .user_metadata
            .get("full_name")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .map(String::from)
            .or_else(|| Some(email.clone()).filter(|e| !e.is_empty()));
        let avatar_url = self
            .user_metadata
            .get("avatar_url")
            .and_then(Value::as_str)
            .map(String::from);

        User {
            id: self.id.clone(),
            email,
            full_name,
            avatar_url,
        }
    }
}

/// Signed-in session; persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    /// Expired, or within a minute of expiring
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|at| at - 60 <= Utc::now().timestamp())
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl From<TokenResponse> for AuthSession {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .or_else(|| token.expires_in.map(|secs| Utc::now().timestamp() + secs));
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user,
        }
    }
}

/// Result of registering an account
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    /// Auto-confirmed; already signed in
    SignedIn(AuthSession),
    /// The platform sent a confirmation email first
    ConfirmationRequired(AuthUser),
}

impl Platform {
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> ClientResult<AuthSession> {
        let response = self
            .http()
            .post(self.config().auth_url("token"))
            .query(&[("grant_type", "password")])
            .headers(self.headers())
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let token: TokenResponse = auth_json(response).await?;
        info!(user_id = %token.user.id, "Signed in");
        Ok(token.into())
    }

    pub async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> ClientResult<SignUpOutcome> {
        let response = self
            .http()
            .post(self.config().auth_url("signup"))
            .headers(self.headers())
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "full_name": full_name },
            }))
            .send()
            .await?;

        let body: Value = auth_json(response).await?;
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)?;
            info!(user_id = %token.user.id, "Registered and signed in");
            return Ok(SignUpOutcome::SignedIn(token.into()));
        }

        let user: AuthUser = match body.get("user") {
            Some(user) => serde_json::from_value(user.clone())?,
            None => serde_json::from_value(body)?,
        };
        info!(user_id = %user.id, "Registered, awaiting email confirmation");
        Ok(SignUpOutcome::ConfirmationRequired(user))
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> ClientResult<AuthSession> {
        let response = self
            .http()
            .post(self.config().auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .headers(self.headers())
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let token: TokenResponse = auth_json(response).await?;
        Ok(token.into())
    }

    /// Account behind an access token
    pub async fn get_auth_user(&self, access_token: &str) -> ClientResult<AuthUser> {
        let response = self
            .http()
            .get(self.config().auth_url("user"))
            .headers(self.headers_with_token(access_token))
            .send()
            .await?;

        auth_json(response).await
    }

    pub async fn sign_out_remote(&self, access_token: &str) -> ClientResult<()> {
        let response = self
            .http()
            .post(self.config().auth_url("logout"))
            .headers(self.headers_with_token(access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let (message, _) = read_error(response).await;
            warn!(status = status.as_u16(), error = %message, "Remote sign-out failed");
            return Err(ClientError::auth(message));
        }
        Ok(())
    }
}

async fn auth_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
    if !response.status().is_success() {
        let (message, _) = read_error(response).await;
        return Err(ClientError::auth(message));
    }
    Ok(response.json().await?)
}
