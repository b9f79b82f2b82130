#![warn(missing_docs)]
//! # cas-client-app
//!
//! ## Purpose
//! Wires the core, validator and session binder into a runnable client and
//! the `cas-client` command-line tool.
//!
//! ## Responsibilities
//! - Resolve [`ClientSettings`] from a JSON file and CLI overrides.
//! - Build a network-backed [`TicketValidator`].
//! - Run one callback request through [`CasAuthenticator`].
//! - Install the `tracing` subscriber for the binary.
//! - Keep tickets out of echoed URLs.
//!
//! ## Data flow
//! Settings file + flags -> [`CasConfig`] -> URL printing, ticket validation
//! or a full `authenticate` pass over an in-memory session.
//!
//! ## Ownership and lifetimes
//! The session store and validator are created per invocation and shared by
//! `Arc` with the authenticator.
//!
//! ## Error model
//! Setup failures (unreadable settings, bad callback URL, unusable redirect
//! target) are wrapped in [`AppError`]. Authentication outcomes are values,
//! not errors.
//!
//! ## Security and privacy notes
//! [`redact_ticket`] strips `casticket` values before a URL is printed.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use cas_client_auth::{
    AuthError, Authentication, CasAuthenticator, MemorySessionStore, OnFailure, OnLogin,
    OnSuccess, RedirectTarget,
};
use cas_client_core::{
    CasConfig, ClientSettings, CoreError, Identity, RequestInfo, TICKET_PARAM, Ticket,
};
use cas_client_validate::{ReqwestTransport, TicketValidator, TracingLogSink};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("CAS_CLIENT_VERSION");

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Installs a `tracing` subscriber honouring `RUST_LOG` (default `info`).
///
/// Calling it more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Loads settings from a JSON file.
///
/// # Errors
/// Returns [`AppError::Settings`] when the file cannot be read or parsed.
pub fn load_settings(path: &Path) -> Result<ClientSettings, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|error| AppError::Settings(format!("{}: {error}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|error| AppError::Settings(format!("{}: {error}", path.display())))
}

/// Combines an optional settings file with CLI overrides.
///
/// # Errors
/// Propagates [`load_settings`] failures.
pub fn resolve_settings(
    path: Option<&Path>,
    service: Option<String>,
    redirect_url: Option<String>,
) -> Result<ClientSettings, AppError> {
    let mut settings = match path {
        Some(path) => load_settings(path)?,
        None => ClientSettings::default(),
    };

    if let Some(service) = service {
        settings.service = service;
    }
    if let Some(redirect_url) = redirect_url {
        settings.redirect_url = redirect_url;
    }

    Ok(settings)
}

/// Builds a validator backed by HTTP and reporting to `tracing`.
pub fn network_validator() -> TicketValidator {
    TicketValidator::new(Arc::new(ReqwestTransport::new())).with_log_sink(Arc::new(TracingLogSink))
}

/// Validates one ticket over the network.
pub fn validate_ticket(
    validator: &TicketValidator,
    config: &CasConfig,
    ticket: &str,
) -> Option<Identity> {
    validator.validate(config, &Ticket::new(ticket), config.timeout_secs())
}

/// Treats `callback_url` as the inbound request and authenticates it against
/// a fresh in-memory session.
///
/// # Errors
/// Returns [`AppError::Core`] when `callback_url` is not an absolute
/// http(s) URL and [`AppError::Auth`] when `deny_redirect` is unusable.
pub fn run_callback(
    config: CasConfig,
    validator: Arc<TicketValidator>,
    callback_url: &str,
    deny_redirect: Option<&str>,
) -> Result<Authentication, AppError> {
    let request = RequestInfo::from_url(callback_url)?;
    let on_failure = match deny_redirect {
        Some(target) => OnFailure::Redirect(RedirectTarget::new(target)?),
        None => OnFailure::default(),
    };

    let mut authenticator = CasAuthenticator::new(
        config,
        validator,
        Arc::new(MemorySessionStore::new()),
        Arc::new(request),
    );
    info!(url = %redact_ticket(&authenticator.current_url()), "handling callback");

    Ok(authenticator.authenticate(on_failure, OnSuccess::default(), OnLogin::default()))
}

/// Renders an authentication outcome as pretty JSON.
///
/// # Errors
/// Returns [`AppError::Render`] when serialization fails.
pub fn render_outcome(outcome: &Authentication) -> Result<String, AppError> {
    serde_json::to_string_pretty(outcome).map_err(AppError::Render)
}

/// Replaces every `casticket` value in `raw` with `<redacted>`.
///
/// Input that does not parse as a URL is returned unchanged.
pub fn redact_ticket(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };
    if !parsed.query_pairs().any(|(key, _)| key == TICKET_PARAM) {
        return raw.to_string();
    }

    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(key, value)| {
            let value = if key == TICKET_PARAM {
                "<redacted>".to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();

    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    parsed.to_string()
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Settings file unreadable or malformed.
    #[error("settings error: {0}")]
    Settings(String),
    /// Request model error.
    #[error("request error: {0}")]
    Core(#[from] CoreError),
    /// Continuation misuse.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    /// Outcome rendering failed.
    #[error("render error: {0}")]
    Render(serde_json::Error),
}
