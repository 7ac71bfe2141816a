//! Users and sessions.
//!
//! The logged-in user is persisted as JSON under [`CURRENT_USER_KEY`] in the
//! client's [`KeyValueStore`](crate::storage::KeyValueStore).

use std::collections::BTreeMap;

use parsekit_engine::{Error as EngineError, Record, Value};
use serde_json::{json, Value as Json};

use crate::client::Client;
use crate::dispatcher::RequestOptions;
use crate::error::{Error, Result};

pub const USER_CLASS: &str = "_User";
pub const CURRENT_USER_KEY: &str = "currentUser";
const SESSION_TOKEN_KEY: &str = "sessionToken";

/// A `_User` record together with its session.
#[derive(Debug, Clone)]
pub struct User {
    record: Record,
    session_token: Option<String>,
}

impl User {
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    pub fn object_id(&self) -> Option<&str> {
        self.record.object_id()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn username(&self) -> Option<String> {
        self.record.get_as::<String>("username").ok().flatten()
    }

    pub fn email(&self) -> Option<String> {
        self.record.get_as::<String>("email").ok().flatten()
    }

    /// Options that authenticate a call as this user.
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            session_token: self.session_token.clone(),
            ..RequestOptions::default()
        }
    }

    /// Build a user from a response, splitting off the session token.
    fn from_response(response: &Json, fallback_token: Option<&str>) -> Result<Self> {
        let mut map = response
            .as_object()
            .cloned()
            .ok_or_else(|| EngineError::InvalidJson("user payload must be an object".into()))?;
        let session_token = match map.remove(SESSION_TOKEN_KEY) {
            Some(Json::String(token)) => Some(token),
            _ => fallback_token.map(str::to_owned),
        };
        let record = Record::from_wire_format(Some(USER_CLASS), &Json::Object(map))?;
        Ok(Self {
            record,
            session_token,
        })
    }

    fn to_stored(&self) -> Result<String> {
        let mut json = self.record.to_wire_format(false)?;
        if let (Some(map), Some(token)) = (json.as_object_mut(), &self.session_token) {
            map.insert(SESSION_TOKEN_KEY.to_owned(), Json::String(token.clone()));
        }
        Ok(json.to_string())
    }

    fn from_stored(raw: &str) -> Result<Self> {
        let json: Json = serde_json::from_str(raw)
            .map_err(|e| Error::Storage(format!("stored user is not valid JSON: {e}")))?;
        Self::from_response(&json, None)
    }
}

impl Client {
    /// Register a new user and make it the current user.
    ///
    /// `fields` are saved with the new user. The password is sent but never
    /// kept on the returned record.
    pub async fn sign_up(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
        fields: BTreeMap<String, Value>,
    ) -> Result<User> {
        let mut record = Record::new(USER_CLASS);
        record.set("username", username)?;
        if let Some(email) = email {
            record.set("email", email)?;
        }
        for (key, value) in fields {
            record.set(&key, value)?;
        }

        let mut body = record.save_payload()?;
        body["password"] = Json::String(password.to_owned());
        let response = self
            .dispatcher()
            .post("users", body, &RequestOptions::default())
            .await?;

        let session_token = response
            .get(SESSION_TOKEN_KEY)
            .and_then(Json::as_str)
            .map(str::to_owned);
        record.apply_save_response(&without_session(&response))?;

        let user = User {
            record,
            session_token,
        };
        self.persist_current_user(&user).await?;
        tracing::info!(user_id = ?user.object_id(), "User signed up");
        Ok(user)
    }

    /// Log in and make the user current.
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        let body = json!({"username": username, "password": password});
        let response = self
            .dispatcher()
            .post("login", body, &RequestOptions::default())
            .await?;
        let user = User::from_response(&response, None)?;
        self.persist_current_user(&user).await?;
        tracing::info!(user_id = ?user.object_id(), "User logged in");
        Ok(user)
    }

    /// The persisted current user, if any.
    pub async fn current_user(&self) -> Result<Option<User>> {
        match self.storage().get_string(CURRENT_USER_KEY).await? {
            Some(raw) => User::from_stored(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// The user owning `session_token`.
    pub async fn me(&self, session_token: &str) -> Result<User> {
        let response = self
            .dispatcher()
            .get("users/me", &[], &RequestOptions::session(session_token))
            .await?;
        User::from_response(&response, Some(session_token))
    }

    /// End the current session.
    ///
    /// The stored user is cleared even if the server call fails; that failure
    /// is still returned.
    pub async fn logout(&self) -> Result<()> {
        let Some(user) = self.current_user().await? else {
            return Ok(());
        };
        let result = match user.session_token() {
            Some(_) => self
                .dispatcher()
                .post("logout", json!({}), &user.request_options())
                .await
                .map(|_| ()),
            None => Ok(()),
        };
        self.storage().remove(CURRENT_USER_KEY).await?;
        tracing::info!(user_id = ?user.object_id(), "User logged out");
        result
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        self.dispatcher()
            .post(
                "requestPasswordReset",
                json!({"email": email}),
                &RequestOptions::default(),
            )
            .await?;
        Ok(())
    }

    async fn persist_current_user(&self, user: &User) -> Result<()> {
        self.storage()
            .set_string(CURRENT_USER_KEY, user.to_stored()?)
            .await
    }
}

fn without_session(response: &Json) -> Json {
    let mut response = response.clone();
    if let Some(map) = response.as_object_mut() {
        map.remove(SESSION_TOKEN_KEY);
    }
    response
}
