#![warn(missing_docs)]
//! # cas-client-auth
//!
//! ## Purpose
//! Drives the CAS authentication lifecycle for one inbound request and binds
//! the resolved identity into the caller's session.
//!
//! ## Responsibilities
//! - Decide between session reuse, ticket validation and login redirect.
//! - Model the per-request transitions in [`AuthStateMachine`].
//! - Read and write the single session key holding the identity.
//! - Hand control back to the web layer through [`Flow`] values instead of
//!   ending the request itself.
//!
//! ## Data flow
//! [`CasAuthenticator::authenticate`] reads [`SessionStore`] -> falls back to
//! the request ticket and [`TicketValidator`] -> runs one of the
//! [`OnSuccess`], [`OnFailure`] or [`OnLogin`] continuations -> returns an
//! [`Authentication`] describing the final state and the response to emit.
//!
//! ## Ownership and lifetimes
//! Collaborators are shared `Arc` handles. Continuation closures borrow from
//! the caller for the duration of one `authenticate` call only.
//!
//! ## Error model
//! Runtime failures (rejected ticket, unreachable provider) are states, not
//! errors. [`AuthError`] is reserved for programmer mistakes such as an
//! unusable redirect target.
//!
//! ## Security and privacy notes
//! Tickets and identities are never logged. A ticket is validated at most
//! once; the next request must carry a fresh one.
//!
//! ## Example
//! ```rust
//! use cas_client_auth::{AuthState, AuthStateMachine};
//!
//! let machine = AuthStateMachine::new();
//! assert!(matches!(machine.state(), AuthState::NoIdentity));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use cas_client_core::{
    CasConfig, Identity, RequestContext, Ticket, build_login_url, build_logout_url,
    build_validation_url,
};
use cas_client_validate::TicketValidator;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Status used for redirects issued by the authenticator.
pub const REDIRECT_STATUS: u16 = 303;
/// Status used when authentication fails.
pub const UNAUTHORIZED_STATUS: u16 = 401;

/// Key-value store backing the caller's session.
pub trait SessionStore: Send + Sync {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;
    /// Stores `value` under `key`.
    fn set(&self, key: &str, value: &str);
    /// Removes `key`. Removing an absent key is a no-op.
    fn delete(&self, key: &str);
}

/// In-memory [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn delete(&self, key: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Authentication state within one `authenticate` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Neither a session identity nor a ticket has been seen.
    NoIdentity,
    /// A ticket was found and is being validated.
    TicketPending,
    /// Identity resolved from the session or from validation.
    Authenticated(Identity),
    /// Validation ran and yielded no identity.
    Rejected,
}

/// Per-request state machine with explicit legal transitions.
#[derive(Debug, Clone)]
pub struct AuthStateMachine {
    state: AuthState,
}

impl AuthStateMachine {
    /// Creates a machine in `NoIdentity`.
    pub fn new() -> Self {
        Self {
            state: AuthState::NoIdentity,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Consumes the machine and returns its state.
    pub fn into_state(self) -> AuthState {
        self.state
    }

    /// Session already holds an identity. Ignored unless in `NoIdentity`.
    pub fn on_session_identity(&mut self, identity: Identity) {
        if matches!(self.state, AuthState::NoIdentity) {
            self.transition(AuthState::Authenticated(identity));
        }
    }

    /// Request carries a ticket. Ignored unless in `NoIdentity`.
    pub fn on_ticket(&mut self) {
        if matches!(self.state, AuthState::NoIdentity) {
            self.transition(AuthState::TicketPending);
        }
    }

    /// Validation finished. Ignored unless in `TicketPending`.
    pub fn on_validated(&mut self, identity: Option<Identity>) {
        if matches!(self.state, AuthState::TicketPending) {
            self.transition(match identity {
                Some(identity) => AuthState::Authenticated(identity),
                None => AuthState::Rejected,
            });
        }
    }

    /// Returns `true` once the machine is `Authenticated` or `Rejected`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            AuthState::Authenticated(_) | AuthState::Rejected
        )
    }

    fn transition(&mut self, next: AuthState) {
        debug!(from = state_name(&self.state), to = state_name(&next), "auth transition");
        self.state = next;
    }
}

impl Default for AuthStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

fn state_name(state: &AuthState) -> &'static str {
    match state {
        AuthState::NoIdentity => "no_identity",
        AuthState::TicketPending => "ticket_pending",
        AuthState::Authenticated(_) => "authenticated",
        AuthState::Rejected => "rejected",
    }
}

/// Response the web layer should emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseAction {
    /// `401 Unauthorized`.
    Unauthorized,
    /// Redirect to `location`.
    Redirect {
        /// Target URL.
        location: String,
        /// Redirect status code.
        status: u16,
    },
    /// `401 Unauthorized` carrying a `Location` header.
    UnauthorizedRedirect {
        /// Target URL.
        location: String,
    },
}

impl ResponseAction {
    /// `303 See Other` redirect to `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
            status: REDIRECT_STATUS,
        }
    }

    /// Returns the status code of the response.
    pub fn status(&self) -> u16 {
        match self {
            Self::Unauthorized | Self::UnauthorizedRedirect { .. } => UNAUTHORIZED_STATUS,
            Self::Redirect { status, .. } => *status,
        }
    }

    /// Returns the `Location` header value, if any.
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Unauthorized => None,
            Self::Redirect { location, .. } | Self::UnauthorizedRedirect { location } => {
                Some(location)
            }
        }
    }
}

/// Control signal returned to the web layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// Keep handling the request.
    Continue,
    /// Keep handling the request; the response carries `ResponseAction`.
    Mark(ResponseAction),
    /// Stop handling the request and emit `ResponseAction`.
    Halt(ResponseAction),
}

impl Flow {
    /// Returns `true` when request handling must stop.
    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halt(_))
    }

    /// Returns the response action, if any.
    pub fn action(&self) -> Option<&ResponseAction> {
        match self {
            Self::Continue => None,
            Self::Mark(action) | Self::Halt(action) => Some(action),
        }
    }
}

/// Validated redirect destination for continuations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget(String);

impl RedirectTarget {
    /// Accepts an absolute http(s) URL or an absolute path.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidContinuation`] for an empty target, one
    /// containing whitespace or control characters, a relative reference, or
    /// a URL with any scheme other than `http` or `https`.
    pub fn new(target: impl Into<String>) -> Result<Self, AuthError> {
        let target = target.into();
        if target.is_empty() {
            return Err(AuthError::InvalidContinuation(
                "redirect target is empty".to_string(),
            ));
        }

        if target
            .chars()
            .any(|ch| ch.is_whitespace() || ch.is_control())
        {
            return Err(AuthError::InvalidContinuation(
                "redirect target contains whitespace or control characters".to_string(),
            ));
        }

        let is_path = target.starts_with('/') && !target.starts_with("//");
        if !is_path {
            let parsed = Url::parse(&target).map_err(|_| {
                AuthError::InvalidContinuation(format!(
                    "redirect target `{target}` is neither an absolute url nor an absolute path"
                ))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AuthError::InvalidContinuation(format!(
                    "redirect target scheme `{}` is not http or https",
                    parsed.scheme()
                )));
            }
        }

        Ok(Self(target))
    }

    /// Returns the target.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Callback invoked with the identity and current URL on success.
pub type SuccessHandler<'a> = Box<dyn FnMut(&Identity, &str) -> Flow + 'a>;
/// Callback invoked with the current URL on failure.
pub type FailureHandler<'a> = Box<dyn FnMut(&str) -> Flow + 'a>;
/// Callback invoked with the login URL when login is required.
pub type LoginHandler<'a> = Box<dyn FnMut(&str) -> ResponseAction + 'a>;

/// What to do once an identity is resolved.
#[derive(Default)]
pub enum OnSuccess<'a> {
    /// Bind the identity into the session and continue.
    #[default]
    BindSession,
    /// Continue without touching the session.
    Ignore,
    /// Redirect to the target and stop.
    Redirect(RedirectTarget),
    /// Delegate to a callback.
    Call(SuccessHandler<'a>),
}

impl<'a> OnSuccess<'a> {
    /// Wraps a closure.
    pub fn call(handler: impl FnMut(&Identity, &str) -> Flow + 'a) -> Self {
        Self::Call(Box::new(handler))
    }
}

/// What to do when validation yields no identity.
#[derive(Default)]
pub enum OnFailure<'a> {
    /// Respond `401` and stop.
    #[default]
    Unauthorized,
    /// Mark the response `401` and keep handling.
    MarkUnauthorized,
    /// Respond `401` with a redirect to the target and stop.
    Redirect(RedirectTarget),
    /// Delegate to a callback.
    Call(FailureHandler<'a>),
}

impl<'a> OnFailure<'a> {
    /// Wraps a closure.
    pub fn call(handler: impl FnMut(&str) -> Flow + 'a) -> Self {
        Self::Call(Box::new(handler))
    }
}

/// What to do when neither a session identity nor a ticket is present.
///
/// Every variant ends the request; a callback must return the response to
/// emit.
#[derive(Default)]
pub enum OnLogin<'a> {
    /// Redirect to the login URL.
    #[default]
    Redirect,
    /// Delegate to a callback receiving the login URL.
    Call(LoginHandler<'a>),
}

impl<'a> OnLogin<'a> {
    /// Wraps a closure.
    pub fn call(handler: impl FnMut(&str) -> ResponseAction + 'a) -> Self {
        Self::Call(Box::new(handler))
    }
}

/// Result of one `authenticate` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authentication {
    /// Terminal state reached.
    pub state: AuthState,
    /// Control signal for the web layer.
    pub flow: Flow,
}

impl Authentication {
    /// Returns the identity when authenticated.
    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            AuthState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

/// CAS session binder for one inbound request.
pub struct CasAuthenticator {
    config: CasConfig,
    validator: Arc<TicketValidator>,
    session: Arc<dyn SessionStore>,
    request: Arc<dyn RequestContext>,
    user_name: Option<Identity>,
}

impl CasAuthenticator {
    /// Creates an authenticator for `request`.
    ///
    /// An empty callback URL in `config` is replaced by the current request
    /// URL.
    pub fn new(
        config: CasConfig,
        validator: Arc<TicketValidator>,
        session: Arc<dyn SessionStore>,
        request: Arc<dyn RequestContext>,
    ) -> Self {
        let config = config.or_current_url(request.current_url());
        Self {
            config,
            validator,
            session,
            request,
            user_name: None,
        }
    }

    /// Runs `authenticate` with the default continuations.
    pub fn authenticate_default(&mut self) -> Authentication {
        self.authenticate(OnFailure::default(), OnSuccess::default(), OnLogin::default())
    }

    /// Resolves the caller's identity.
    ///
    /// 1. A session identity authenticates directly.
    /// 2. Otherwise a ticket in the request is validated once.
    /// 3. Otherwise the login continuation ends the request.
    ///
    /// Nothing but the session store carries over between calls.
    pub fn authenticate(
        &mut self,
        on_failure: OnFailure<'_>,
        on_success: OnSuccess<'_>,
        on_login: OnLogin<'_>,
    ) -> Authentication {
        let mut machine = AuthStateMachine::new();
        let current_url = self.request.current_url();

        if let Some(identity) = self.session_identity() {
            machine.on_session_identity(identity.clone());
            self.user_name = Some(identity.clone());
            let flow = self.succeed(&identity, &current_url, on_success);
            return Authentication {
                state: machine.into_state(),
                flow,
            };
        }

        let Some(ticket) = self.request.ticket() else {
            debug!("no session identity and no ticket; login required");
            let login_url = self.login_url();
            let action = match on_login {
                OnLogin::Redirect => ResponseAction::redirect(login_url),
                OnLogin::Call(mut handler) => handler(&login_url),
            };
            return Authentication {
                state: machine.into_state(),
                flow: Flow::Halt(action),
            };
        };

        machine.on_ticket();
        let validated = self
            .validator
            .validate(&self.config, &ticket, self.config.timeout_secs());
        machine.on_validated(validated.clone());

        let flow = match validated {
            Some(identity) => {
                self.user_name = Some(identity.clone());
                self.succeed(&identity, &current_url, on_success)
            }
            None => Self::fail(&current_url, on_failure),
        };

        Authentication {
            state: machine.into_state(),
            flow,
        }
    }

    /// Clears the bound identity, then notifies the logout endpoint.
    ///
    /// The local clear always happens. Returns whether the provider
    /// acknowledged the notification.
    pub fn logout(&mut self) -> bool {
        self.set_user_name(None);
        let url = self.logout_url();
        self.validator
            .notify_logout(&url, self.config.timeout_secs())
    }

    /// Returns the cached identity, else the session identity. Never
    /// validates.
    pub fn get_user_name(&self) -> Option<Identity> {
        self.user_name.clone().or_else(|| self.session_identity())
    }

    /// Sets or clears the cached identity and the session entry together.
    pub fn set_user_name(&mut self, name: Option<Identity>) {
        let key = self.config.session_var();
        match &name {
            Some(identity) => self.session.set(&key, identity.as_str()),
            None => self.session.delete(&key),
        }
        self.user_name = name;
    }

    /// Returns the service code.
    pub fn service(&self) -> &str {
        self.config.service()
    }

    /// Returns the callback URL.
    pub fn redirect_url(&self) -> &str {
        self.config.redirect_url()
    }

    /// Returns the session key currently in effect.
    pub fn session_var(&self) -> String {
        self.config.session_var()
    }

    /// Returns the login URL.
    pub fn login_url(&self) -> String {
        build_login_url(&self.config)
    }

    /// Returns the validation URL for the current request's ticket.
    pub fn validation_url(&self) -> String {
        let ticket = self.ticket().unwrap_or_else(|| Ticket::new(""));
        build_validation_url(&self.config, &ticket)
    }

    /// Returns the logout URL.
    pub fn logout_url(&self) -> String {
        build_logout_url(&self.config)
    }

    /// Returns the ticket in the current request.
    pub fn ticket(&self) -> Option<Ticket> {
        self.request.ticket()
    }

    /// Returns the URL of the current request.
    pub fn current_url(&self) -> String {
        self.request.current_url()
    }

    fn session_identity(&self) -> Option<Identity> {
        self.session
            .get(&self.config.session_var())
            .filter(|value| !value.is_empty())
            .map(Identity::new)
    }

    fn succeed(
        &mut self,
        identity: &Identity,
        current_url: &str,
        on_success: OnSuccess<'_>,
    ) -> Flow {
        match on_success {
            OnSuccess::BindSession => {
                self.set_user_name(Some(identity.clone()));
                Flow::Continue
            }
            OnSuccess::Ignore => Flow::Continue,
            OnSuccess::Redirect(target) => Flow::Halt(ResponseAction::redirect(target.0)),
            OnSuccess::Call(mut handler) => handler(identity, current_url),
        }
    }

    fn fail(current_url: &str, on_failure: OnFailure<'_>) -> Flow {
        match on_failure {
            OnFailure::Unauthorized => Flow::Halt(ResponseAction::Unauthorized),
            OnFailure::MarkUnauthorized => Flow::Mark(ResponseAction::Unauthorized),
            OnFailure::Redirect(target) => {
                Flow::Halt(ResponseAction::UnauthorizedRedirect { location: target.0 })
            }
            OnFailure::Call(mut handler) => handler(current_url),
        }
    }
}

/// Errors produced by misuse of the auth API.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A continuation argument cannot be honoured.
    #[error("invalid continuation: {0}")]
    InvalidContinuation(String),
}
