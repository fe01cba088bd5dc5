//! Process-wide authentication state.
//!
//! `SessionStore` is the only owner of [`Session`]. Readers subscribe to a
//! watch channel instead of polling. The persisted token is written here
//! (login/logout) and by the gateway's authorization interceptor, nowhere
//! else.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{OnceCell, watch};
use tracing::{debug, error, info, warn};

use crate::error::ClientError;
use crate::gateway::{ApiGateway, HookId};
use crate::models::{LoginRequest, ProfileUpdate, RegisterRequest, UserProfile};
use crate::navigation::{Navigator, Route};
use crate::storage::TokenStore;

const LOGIN_FAILED: &str = "Login failed, please check your credentials";
const REGISTER_FAILED: &str = "Registration failed, please try again later";
const PROFILE_UPDATE_FAILED: &str = "Profile update failed, please try again later";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Initializing,
    Authenticated,
    Unauthenticated,
}

/// Authenticated identity of this client.
///
/// Only constructible through the three state constructors, so
/// `Authenticated` always carries both a token and a user and the other
/// states carry neither.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    status: SessionStatus,
    token: Option<String>,
    user: Option<UserProfile>,
    authenticated_at: Option<DateTime<Utc>>,
}

impl Session {
    fn initializing() -> Self {
        Self {
            status: SessionStatus::Initializing,
            token: None,
            user: None,
            authenticated_at: None,
        }
    }

    fn unauthenticated() -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            ..Self::initializing()
        }
    }

    fn authenticated(token: String, user: UserProfile) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            token: Some(token),
            user: Some(user),
            authenticated_at: Some(Utc::now()),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn authenticated_at(&self) -> Option<DateTime<Utc>> {
        self.authenticated_at
    }
}

/// Result of a user-initiated auth action. Failures carry a message fit for
/// display on the form; errors never escape to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome<T> {
    Success(T),
    Failure { message: String },
}

impl<T> AuthOutcome<T> {
    fn failure(err: &ClientError, fallback: &str) -> Self {
        AuthOutcome::Failure {
            message: err.detail().unwrap_or(fallback).to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            AuthOutcome::Success(_) => None,
            AuthOutcome::Failure { message } => Some(message.as_str()),
        }
    }
}

pub struct SessionStore {
    gateway: Arc<ApiGateway>,
    navigator: Arc<Navigator>,
    state: Arc<watch::Sender<Session>>,
    init: OnceCell<SessionStatus>,
    revocation_hook: HookId,
}

impl SessionStore {
    /// Creates the store in `Initializing` and subscribes it to the
    /// gateway's revocation event.
    pub fn new(gateway: Arc<ApiGateway>, navigator: Arc<Navigator>) -> Self {
        let (tx, _) = watch::channel(Session::initializing());
        let state = Arc::new(tx);

        let revocation_hook = {
            let state = Arc::clone(&state);
            let navigator = Arc::clone(&navigator);
            gateway.on_authorization_revoked(Arc::new(move || {
                warn!("Backend rejected the session credential, signing out");
                state.send_replace(Session::unauthenticated());
                navigator.navigate(Route::Login);
            }))
        };

        Self {
            gateway,
            navigator,
            state,
            init: OnceCell::new(),
            revocation_hook,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.state.borrow().user.clone()
    }

    pub fn navigator(&self) -> Arc<Navigator> {
        Arc::clone(&self.navigator)
    }

    fn tokens(&self) -> Arc<dyn TokenStore> {
        self.gateway.tokens()
    }

    /// Restores the session from the persisted token. Runs once per store;
    /// concurrent and later callers share the first call's outcome.
    pub async fn initialize(&self) -> SessionStatus {
        *self.init.get_or_init(|| self.restore()).await
    }

    async fn restore(&self) -> SessionStatus {
        let token = match self.tokens().load().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                info!("No persisted token, starting unauthenticated");
                self.settle_initializing(Session::unauthenticated());
                return self.status();
            }
            Err(e) => {
                warn!("Failed to read persisted token: {}", e);
                self.clear_token().await;
                self.settle_initializing(Session::unauthenticated());
                return self.status();
            }
        };

        match self.gateway.current_user().await {
            Ok(user) => {
                info!("Restored session for {}", user.email);
                self.settle_initializing(Session::authenticated(token, user));
            }
            Err(e) => {
                error!("Failed to restore session: {}", e);
                self.clear_token_if(&token).await;
                self.settle_initializing(Session::unauthenticated());
            }
        }
        self.status()
    }

    /// Applies the initialization result unless a login, logout or
    /// revocation already moved the session on.
    fn settle_initializing(&self, next: Session) {
        self.state.send_if_modified(|session| {
            if session.status == SessionStatus::Initializing {
                *session = next;
                true
            } else {
                debug!("Session already {:?}, dropping restore result", session.status);
                false
            }
        });
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthOutcome<UserProfile> {
        info!("Logging in {}", email);

        let credentials = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let token = match self.gateway.login(&credentials).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Login failed for {}: {}", email, e);
                return AuthOutcome::failure(&e, LOGIN_FAILED);
            }
        };

        if let Err(e) = self.tokens().save(&token.access_token).await {
            error!("Failed to persist token: {}", e);
            return AuthOutcome::Failure {
                message: LOGIN_FAILED.to_string(),
            };
        }

        match self.gateway.current_user().await {
            Ok(user) => {
                if !self.token_is_current(&token.access_token).await {
                    // logout or revocation ran while the profile was loading
                    warn!("Session for {} ended before login completed", email);
                    return AuthOutcome::Failure {
                        message: LOGIN_FAILED.to_string(),
                    };
                }
                info!("Logged in as {} ({})", user.full_name, user.role);
                self.state
                    .send_replace(Session::authenticated(token.access_token, user.clone()));
                AuthOutcome::Success(user)
            }
            Err(e) => {
                // no user means no session: drop the token we just stored
                error!("Failed to load profile after login: {}", e);
                self.clear_token().await;
                self.state.send_replace(Session::unauthenticated());
                AuthOutcome::failure(&e, LOGIN_FAILED)
            }
        }
    }

    /// Creates an account. Does not sign in.
    pub async fn register(&self, registration: &RegisterRequest) -> AuthOutcome<UserProfile> {
        info!("Registering {}", registration.email);
        match self.gateway.register(registration).await {
            Ok(created) => AuthOutcome::Success(created),
            Err(e) => {
                warn!("Registration failed for {}: {}", registration.email, e);
                AuthOutcome::failure(&e, REGISTER_FAILED)
            }
        }
    }

    /// Idempotent.
    pub async fn logout(&self) {
        self.clear_token().await;
        let was = self.state.send_replace(Session::unauthenticated());
        if was.is_authenticated() {
            info!("Logged out");
        }
        self.navigator.navigate(Route::Login);
    }

    /// Replaces the cached profile wholesale. Returns false, and changes
    /// nothing, when there is no authenticated session.
    pub fn update_profile(&self, profile: UserProfile) -> bool {
        self.state.send_if_modified(|session| {
            if session.is_authenticated() {
                session.user = Some(profile);
                true
            } else {
                false
            }
        })
    }

    /// Saves profile changes on the backend, then caches the returned profile.
    pub async fn save_profile(&self, update: &ProfileUpdate) -> AuthOutcome<UserProfile> {
        match self.gateway.update_current_user(update).await {
            Ok(profile) => {
                self.update_profile(profile.clone());
                AuthOutcome::Success(profile)
            }
            Err(e) => {
                warn!("Profile update failed: {}", e);
                AuthOutcome::failure(&e, PROFILE_UPDATE_FAILED)
            }
        }
    }

    async fn clear_token(&self) {
        if let Err(e) = self.tokens().clear().await {
            error!("Failed to clear persisted token: {}", e);
        }
    }

    async fn token_is_current(&self, expected: &str) -> bool {
        matches!(self.tokens().load().await, Ok(Some(current)) if current == expected)
    }

    async fn clear_token_if(&self, expected: &str) {
        match self.tokens().load().await {
            Ok(Some(current)) if current == expected => self.clear_token().await,
            Ok(_) => {}
            Err(e) => warn!("Failed to read persisted token: {}", e),
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.gateway.remove_revocation_hook(self.revocation_hook);
    }
}
