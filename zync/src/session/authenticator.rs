//! Credential checks behind the session store.

use crate::backend::{BackendClient, BackendError, LoginRequest};
use crate::fixtures;
use crate::types::User;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Errors from an [`Authenticator`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The token does not belong to any session
    #[error("Session token is not valid")]
    InvalidToken,

    /// Backend call failed
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// A user together with the token that proves the session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authenticated {
    /// Signed-in user
    pub user: User,
    /// Session token
    pub token: String,
}

/// Boxed future returned by [`Authenticator`] operations
pub type AuthFuture<T> = Pin<Box<dyn Future<Output = Result<T, AuthError>> + Send>>;

/// Authenticator trait
///
/// Resolves credentials and stored tokens to users. `login` returns `Ok(None)`
/// for unknown identifiers or wrong secrets; `Err` is reserved for failures
/// that say nothing about the credentials.
pub trait Authenticator: Send + Sync {
    /// Check credentials
    fn login(&self, identifier: String, secret: String) -> AuthFuture<Option<Authenticated>>;

    /// Resolve a persisted token back to its user
    fn current_user(&self, token: String) -> AuthFuture<User>;
}

/// Authenticator backed by a fixed list of users
///
/// Matches the identifier against user emails, ignoring ASCII case. The secret
/// is not checked.
#[derive(Clone, Debug)]
pub struct InMemoryDirectory {
    users: Arc<Vec<User>>,
    token: String,
}

impl InMemoryDirectory {
    /// Directory over `users`, issuing `token` to every session
    #[must_use]
    pub fn new(users: Vec<User>, token: impl Into<String>) -> Self {
        Self {
            users: Arc::new(users),
            token: token.into(),
        }
    }

    /// The built-in development directory
    #[must_use]
    pub fn development() -> Self {
        Self::new(fixtures::users(), fixtures::DEVELOPMENT_TOKEN)
    }

    /// Find a user by email, ignoring ASCII case
    #[must_use]
    pub fn find(&self, identifier: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(identifier.trim()))
    }
}

impl Authenticator for InMemoryDirectory {
    fn login(&self, identifier: String, _secret: String) -> AuthFuture<Option<Authenticated>> {
        let found = self.find(&identifier).cloned().map(|user| Authenticated {
            user,
            token: self.token.clone(),
        });
        Box::pin(async move { Ok(found) })
    }

    fn current_user(&self, token: String) -> AuthFuture<User> {
        // Every development session shares one token, so it maps to the first user.
        let user = (token == self.token)
            .then(|| self.users.first().cloned())
            .flatten()
            .ok_or(AuthError::InvalidToken);
        Box::pin(async move { user })
    }
}

/// Authenticator that delegates to the Zync backend
#[derive(Clone, Debug)]
pub struct BackendAuthenticator {
    client: BackendClient,
}

impl BackendAuthenticator {
    /// Wrap a backend client
    #[must_use]
    pub const fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

impl Authenticator for BackendAuthenticator {
    fn login(&self, identifier: String, secret: String) -> AuthFuture<Option<Authenticated>> {
        let client = self.client.clone();
        Box::pin(async move {
            let request = LoginRequest {
                email: identifier,
                password: (!secret.is_empty()).then_some(secret),
            };

            let token = match client.login(&request).await {
                Ok(token) => token,
                Err(BackendError::Unauthorized(_) | BackendError::ApiError { status: 404, .. }) => {
                    return Ok(None);
                },
                Err(e) => return Err(e.into()),
            };

            let user = client.me(&token).await?;
            Ok(Some(Authenticated {
                user: user.into(),
                token,
            }))
        })
    }

    fn current_user(&self, token: String) -> AuthFuture<User> {
        let client = self.client.clone();
        Box::pin(async move {
            match client.me(&token).await {
                Ok(user) => Ok(user.into()),
                Err(BackendError::Unauthorized(_)) => Err(AuthError::InvalidToken),
                Err(e) => Err(e.into()),
            }
        })
    }
}
