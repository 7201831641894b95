//! Authentication hook for admitting participants.
//!
//! Cardroom doesn't verify credentials itself. The server calls an
//! [`Authenticator`] with the token and join options the client sent, and
//! only a successful result lets the connection into a room. Token
//! formats, user stores and remote verification services all live behind
//! this trait.

use std::collections::HashMap;

use serde_json::Value;

use crate::SessionError;

/// The external user a connection was resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Stable id in the external user store.
    pub user_id: String,

    /// Optional human-readable name, for logs.
    pub display_name: Option<String>,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Validates a join request and resolves the user behind it.
///
/// `Send + Sync + 'static`: one authenticator is shared by every
/// connection task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use cardroom_session::{Authenticator, SessionError, UserIdentity};
/// use serde_json::Value;
///
/// /// Accepts any non-empty token and uses it as the user id.
/// struct TrustingAuthenticator;
///
/// impl Authenticator for TrustingAuthenticator {
///     async fn authenticate(
///         &self,
///         token: &str,
///         _options: &Value,
///     ) -> Result<UserIdentity, SessionError> {
///         if token.is_empty() {
///             return Err(SessionError::AuthFailed("empty token".into()));
///         }
///         Ok(UserIdentity::new(token))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Resolves `token` (plus the client's join `options`) to a user.
    ///
    /// The joining connection waits on this future; nothing is created in
    /// the room until it resolves.
    ///
    /// # Errors
    /// [`SessionError::AuthFailed`] refuses the join.
    fn authenticate(
        &self,
        token: &str,
        options: &Value,
    ) -> impl std::future::Future<Output = Result<UserIdentity, SessionError>> + Send;
}

/// An [`Authenticator`] backed by a fixed token → user table.
///
/// Meant for development servers and tests.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: HashMap<String, UserIdentity>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` as belonging to `user_id`.
    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), UserIdentity::new(user_id));
        self
    }

    /// Parses `token=user` pairs separated by commas. Malformed pairs are
    /// skipped.
    pub fn parse(spec: &str) -> Self {
        spec.split(',')
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(token, user)| !token.is_empty() && !user.is_empty())
            .fold(Self::new(), |table, (token, user)| table.with_token(token, user))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for TokenTable {
    async fn authenticate(
        &self,
        token: &str,
        _options: &Value,
    ) -> Result<UserIdentity, SessionError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| SessionError::AuthFailed("unknown token".into()))
    }
}
