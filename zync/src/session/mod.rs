//! Session store: who is signed in, their wallet, and their song request.
//!
//! The session is authenticated exactly when both a user and a token are
//! present; the two are only ever set and cleared together.
//!
//! Balance and points change by deltas and can never go negative. A rejected
//! command leaves the state untouched and records the reason in
//! [`SessionState::last_error`], which every command resets first.

mod authenticator;

pub use authenticator::{
    AuthError, AuthFuture, Authenticated, Authenticator, BackendAuthenticator, InMemoryDirectory,
};

use crate::storage::{TokenStorage, AUTH_TOKEN_KEY};
use crate::types::{LoginAttemptId, PaymentMethod, SongRequest, SongRequestId, Track, User};
use std::sync::Arc;
use zync_core::effect::{Effect, EffectId};
use zync_core::environment::Clock;
use zync_core::reducer::Reducer;
use zync_core::{smallvec, SmallVec};

/// Cancellation key of the token write started by a login
const PERSIST_TOKEN: &str = "session-persist-token";

/// Cancellation key of the startup restore
const RESTORE_SESSION: &str = "session-restore";

/// Session state
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    user: Option<User>,
    token: Option<String>,
    is_loading: bool,
    pending_login: Option<LoginAttemptId>,
    active_request: Option<SongRequest>,
    /// Reason the last command was rejected
    pub last_error: Option<String>,
}

impl SessionState {
    /// Unauthenticated session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Session already signed in as `user`
    #[must_use]
    pub fn signed_in(user: User, token: impl Into<String>) -> Self {
        Self {
            user: Some(user),
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// `true` iff both a user and a token are present
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }

    /// Signed-in user
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Session token
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// `true` while a stored token is being resolved at startup
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// `true` while a login is waiting for the authenticator
    #[must_use]
    pub const fn is_logging_in(&self) -> bool {
        self.pending_login.is_some()
    }

    /// The outstanding song request
    #[must_use]
    pub const fn active_request(&self) -> Option<&SongRequest> {
        self.active_request.as_ref()
    }

    /// Wallet balance, 0 when signed out
    #[must_use]
    pub fn balance(&self) -> u64 {
        self.user.as_ref().map_or(0, |u| u.balance)
    }

    /// Loyalty points, 0 when signed out
    #[must_use]
    pub fn points(&self) -> u64 {
        self.user.as_ref().map_or(0, |u| u.zync_points)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// How a login attempt ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Credentials accepted
    Authenticated(Authenticated),
    /// No such user, or wrong secret
    UnknownIdentifier,
    /// Another login was already in flight
    Busy,
    /// Authenticator could not answer
    Failed {
        /// Error message
        reason: String,
    },
}

impl LoginOutcome {
    /// `true` only for [`LoginOutcome::Authenticated`]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Session actions
#[derive(Clone, Debug)]
pub enum SessionAction {
    // Commands
    /// Sign in
    Login {
        /// Correlates the outcome
        attempt: LoginAttemptId,
        /// Email
        identifier: String,
        /// Password; empty when the authenticator does not check one
        secret: String,
    },
    /// Sign out
    Logout,
    /// Resolve a persisted token at startup
    Restore,
    /// Add to the balance
    Credit {
        /// Currency units
        amount: u64,
    },
    /// Take from the balance
    Debit {
        /// Currency units
        amount: u64,
    },
    /// Add loyalty points
    CreditPoints {
        /// Points
        points: u64,
    },
    /// Redeem loyalty points
    DebitPoints {
        /// Points
        points: u64,
    },
    /// Claim the song-request slot and pay for it
    SubmitSongRequest {
        /// Request id
        request_id: SongRequestId,
        /// Requested track
        track: Track,
        /// Price taken from the balance
        price: u64,
    },
    /// Free the song-request slot
    ClearRequest,
    /// Save a card
    AddPaymentMethod {
        /// Card
        method: PaymentMethod,
    },

    // Events
    /// Authenticator answered a login
    LoginFinished {
        /// Attempt being answered
        attempt: LoginAttemptId,
        /// Result
        outcome: LoginOutcome,
    },
    /// Startup restore finished
    Restored {
        /// Session recovered from storage
        session: Option<Authenticated>,
    },
    /// Logout completed and the stored token is gone
    SessionEnded,
}

/// Session environment
#[derive(Clone)]
pub struct SessionEnvironment {
    /// Credential checks
    pub authenticator: Arc<dyn Authenticator>,
    /// Token persistence
    pub storage: Arc<dyn TokenStorage>,
    /// Time source for request timestamps
    pub clock: Arc<dyn Clock>,
}

impl SessionEnvironment {
    /// Creates a new session environment
    #[must_use]
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        storage: Arc<dyn TokenStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            authenticator,
            storage,
            clock,
        }
    }
}

/// Session reducer
#[derive(Clone, Debug, Default)]
pub struct SessionReducer;

impl SessionReducer {
    /// Creates a new session reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Apply `change` to the signed-in user, or record why it was refused
    fn update_user(state: &mut SessionState, change: impl FnOnce(&mut User) -> Result<(), String>) {
        let Some(user) = state.user.as_mut() else {
            state.last_error = Some("Not signed in".to_string());
            return;
        };
        if let Err(reason) = change(user) {
            tracing::debug!(%reason, "Session command rejected");
            state.last_error = Some(reason);
        }
    }

    fn login_effect(
        env: &SessionEnvironment,
        attempt: LoginAttemptId,
        identifier: String,
        secret: String,
    ) -> Effect<SessionAction> {
        let authenticator = Arc::clone(&env.authenticator);
        Effect::future(async move {
            let outcome = match authenticator.login(identifier, secret).await {
                Ok(Some(session)) => LoginOutcome::Authenticated(session),
                Ok(None) => LoginOutcome::UnknownIdentifier,
                Err(e) => LoginOutcome::Failed {
                    reason: e.to_string(),
                },
            };
            Some(SessionAction::LoginFinished { attempt, outcome })
        })
    }

    fn restore_effect(env: &SessionEnvironment) -> Effect<SessionAction> {
        let authenticator = Arc::clone(&env.authenticator);
        let storage = Arc::clone(&env.storage);
        Effect::future(async move {
            let token = match storage.load(AUTH_TOKEN_KEY).await {
                Ok(Some(token)) => token,
                Ok(None) => return Some(SessionAction::Restored { session: None }),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not read stored token");
                    return Some(SessionAction::Restored { session: None });
                },
            };

            match authenticator.current_user(token.clone()).await {
                Ok(user) => Some(SessionAction::Restored {
                    session: Some(Authenticated { user, token }),
                }),
                Err(e) => {
                    tracing::info!(error = %e, "Stored token rejected, discarding it");
                    if let Err(e) = storage.delete(AUTH_TOKEN_KEY).await {
                        tracing::warn!(error = %e, "Could not delete stale token");
                    }
                    Some(SessionAction::Restored { session: None })
                },
            }
        })
        .cancellable(EffectId::new(RESTORE_SESSION))
    }

    fn persist_token_effect(env: &SessionEnvironment, token: String) -> Effect<SessionAction> {
        let storage = Arc::clone(&env.storage);
        Effect::future(async move {
            if let Err(e) = storage.save(AUTH_TOKEN_KEY, token).await {
                tracing::warn!(error = %e, "Could not persist token");
            }
            None
        })
        .cancellable(EffectId::new(PERSIST_TOKEN))
    }

    fn end_session_effect(env: &SessionEnvironment) -> Effect<SessionAction> {
        let storage = Arc::clone(&env.storage);
        Effect::future(async move {
            if let Err(e) = storage.delete(AUTH_TOKEN_KEY).await {
                tracing::warn!(error = %e, "Could not delete stored token");
            }
            Some(SessionAction::SessionEnded)
        })
    }
}

impl Reducer for SessionReducer {
    type State = SessionState;
    type Action = SessionAction;
    type Environment = SessionEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Authentication ==========
            SessionAction::Login {
                attempt,
                identifier,
                secret,
            } => {
                state.last_error = None;
                if state.pending_login.is_some() {
                    state.last_error = Some("A login is already in progress".to_string());
                    return smallvec![Effect::future(async move {
                        Some(SessionAction::LoginFinished {
                            attempt,
                            outcome: LoginOutcome::Busy,
                        })
                    })];
                }

                state.pending_login = Some(attempt);
                smallvec![Self::login_effect(env, attempt, identifier, secret)]
            },

            SessionAction::LoginFinished { attempt, outcome } => {
                if outcome == LoginOutcome::Busy {
                    return smallvec![Effect::None];
                }
                if state.pending_login != Some(attempt) {
                    tracing::debug!(%attempt, "Ignoring result of an abandoned login");
                    return smallvec![Effect::None];
                }
                state.pending_login = None;

                match outcome {
                    LoginOutcome::Authenticated(Authenticated { user, token }) => {
                        tracing::info!(user_id = %user.id, "Signed in");
                        metrics::counter!("zync.session.logins", "outcome" => "authenticated")
                            .increment(1);
                        state.user = Some(user);
                        state.token = Some(token.clone());
                        smallvec![Self::persist_token_effect(env, token)]
                    },
                    LoginOutcome::UnknownIdentifier => {
                        metrics::counter!("zync.session.logins", "outcome" => "unknown").increment(1);
                        state.last_error = Some("Unknown user or wrong password".to_string());
                        smallvec![Effect::None]
                    },
                    LoginOutcome::Failed { reason } => {
                        tracing::warn!(%reason, "Login failed");
                        metrics::counter!("zync.session.logins", "outcome" => "failed").increment(1);
                        state.last_error = Some(reason);
                        smallvec![Effect::None]
                    },
                    LoginOutcome::Busy => smallvec![Effect::None],
                }
            },

            SessionAction::Logout => {
                let was_restoring = state.is_loading;
                state.reset();

                let mut effects: SmallVec<[Effect<SessionAction>; 4]> = smallvec![
                    Effect::Cancel(EffectId::new(PERSIST_TOKEN)),
                    Effect::Cancel(EffectId::new(RESTORE_SESSION)),
                    Self::end_session_effect(env),
                ];
                if was_restoring {
                    // Answer anyone waiting on the aborted restore
                    effects.push(Effect::future(async { Some(SessionAction::Restored { session: None }) }));
                }
                effects
            },

            SessionAction::SessionEnded => {
                tracing::info!("Session ended");
                smallvec![Effect::None]
            },

            SessionAction::Restore => {
                if state.is_loading {
                    return smallvec![Effect::None];
                }
                state.is_loading = true;
                smallvec![Self::restore_effect(env)]
            },

            SessionAction::Restored { session } => {
                if !state.is_loading {
                    tracing::debug!("Ignoring result of an abandoned restore");
                    return smallvec![Effect::None];
                }
                state.is_loading = false;
                match session {
                    Some(Authenticated { user, token })
                        if !state.is_authenticated() && state.pending_login.is_none() =>
                    {
                        tracing::info!(user_id = %user.id, "Session restored");
                        state.user = Some(user);
                        state.token = Some(token);
                    },
                    _ => {},
                }
                smallvec![Effect::None]
            },

            // ========== Wallet ==========
            SessionAction::Credit { amount } => {
                state.last_error = None;
                Self::update_user(state, |user| {
                    user.balance = user
                        .balance
                        .checked_add(amount)
                        .ok_or_else(|| "Balance overflow".to_string())?;
                    Ok(())
                });
                smallvec![Effect::None]
            },

            SessionAction::Debit { amount } => {
                state.last_error = None;
                Self::update_user(state, |user| {
                    user.balance = user
                        .balance
                        .checked_sub(amount)
                        .ok_or_else(|| "Insufficient balance".to_string())?;
                    Ok(())
                });
                smallvec![Effect::None]
            },

            SessionAction::CreditPoints { points } => {
                state.last_error = None;
                Self::update_user(state, |user| {
                    user.zync_points = user
                        .zync_points
                        .checked_add(points)
                        .ok_or_else(|| "Points overflow".to_string())?;
                    Ok(())
                });
                smallvec![Effect::None]
            },

            SessionAction::DebitPoints { points } => {
                state.last_error = None;
                Self::update_user(state, |user| {
                    user.zync_points = user
                        .zync_points
                        .checked_sub(points)
                        .ok_or_else(|| "Insufficient points".to_string())?;
                    Ok(())
                });
                smallvec![Effect::None]
            },

            SessionAction::AddPaymentMethod { method } => {
                state.last_error = None;
                Self::update_user(state, |user| {
                    if user.cards.iter().any(|c| c.id == method.id) {
                        return Err(format!("Card {} is already saved", method.id));
                    }
                    user.cards.push(method);
                    Ok(())
                });
                smallvec![Effect::None]
            },

            // ========== Song requests ==========
            SessionAction::SubmitSongRequest {
                request_id,
                track,
                price,
            } => {
                state.last_error = None;
                if state.active_request.is_some() {
                    state.last_error = Some("A song request is already active".to_string());
                    return smallvec![Effect::None];
                }

                let mut accepted = false;
                Self::update_user(state, |user| {
                    user.balance = user
                        .balance
                        .checked_sub(price)
                        .ok_or_else(|| "Insufficient balance for song request".to_string())?;
                    accepted = true;
                    Ok(())
                });

                if accepted {
                    tracing::info!(track_id = %track.id, price, "Song request accepted");
                    state.active_request = Some(SongRequest {
                        id: request_id,
                        track,
                        price,
                        requested_at: env.clock.now(),
                    });
                }
                smallvec![Effect::None]
            },

            SessionAction::ClearRequest => {
                state.active_request = None;
                smallvec![Effect::None]
            },
        }
    }
}
