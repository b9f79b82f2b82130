#![warn(missing_docs)]
//! # cas-client-core
//!
//! ## Purpose
//! Defines the configuration, request model and URL construction shared by
//! the `cas-client` workspace.
//!
//! ## Responsibilities
//! - Hold immutable client settings (service code, callback URL).
//! - Resolve endpoint and session settings through a live [`ConfigSource`].
//! - Build the login, validation and logout URLs of the CAS protocol.
//! - Describe the inbound request (query parameters, reconstructed URL).
//!
//! ## Data flow
//! [`ClientSettings`] + [`ConfigSource`] form a [`CasConfig`].
//! [`build_login_url`], [`build_validation_url`] and [`build_logout_url`]
//! derive protocol URLs from it. [`RequestContext`] exposes the returned
//! [`Ticket`] and the URL the caller is currently serving.
//!
//! ## Ownership and lifetimes
//! Settings own their strings. The config source is shared behind an `Arc` so
//! one source can back many request-scoped configs.
//!
//! ## Error model
//! Missing configuration is never an error: defaults are substituted.
//! Request URL parsing failures return [`CoreError`].
//!
//! ## Security and privacy notes
//! [`Ticket`] hides its value from `Debug` output. Identities are treated as
//! opaque and are never transformed beyond whitespace trimming upstream.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use cas_client_core::{CasConfig, ClientSettings, MapConfigSource, build_login_url};
//!
//! let config = CasConfig::new(
//!     ClientSettings::new("https://app.example.test/auth", "IU"),
//!     Arc::new(MapConfigSource::new()),
//! );
//! assert_eq!(
//!     build_login_url(&config),
//!     "https://cas.iu.edu/cas/login?cassvc=IU&casurl=https%3A%2F%2Fapp.example.test%2Fauth"
//! );
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Default CAS login endpoint.
pub const DEFAULT_LOGIN_URL: &str = "https://cas.iu.edu/cas/login";
/// Default CAS validation endpoint.
pub const DEFAULT_VALIDATION_URL: &str = "https://cas.iu.edu/cas/validate";
/// Default CAS logout endpoint.
pub const DEFAULT_LOGOUT_URL: &str = "https://cas.iu.edu/cas/logout";
/// Default session key holding the bound identity.
pub const DEFAULT_SESSION_VAR: &str = "CAS_USER";
/// Default service code.
pub const DEFAULT_SERVICE: &str = "IU";
/// Default connect timeout for the validation call, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Config key overriding [`DEFAULT_LOGIN_URL`].
pub const LOGIN_URL_KEY: &str = "CAS_LOGIN_URL";
/// Config key overriding [`DEFAULT_VALIDATION_URL`].
pub const VALIDATION_URL_KEY: &str = "CAS_VALIDATION_URL";
/// Config key overriding [`DEFAULT_LOGOUT_URL`].
pub const LOGOUT_URL_KEY: &str = "CAS_LOGOUT_URL";
/// Config key overriding [`DEFAULT_SESSION_VAR`].
pub const SESSION_VAR_KEY: &str = "CAS_SESSION_VAR";
/// Config key overriding [`DEFAULT_TIMEOUT_SECS`].
pub const TIMEOUT_KEY: &str = "CAS_TIMEOUT";

/// Query parameter carrying the service code.
pub const SERVICE_PARAM: &str = "cassvc";
/// Query parameter carrying the percent-encoded callback URL.
pub const CALLBACK_PARAM: &str = "casurl";
/// Query parameter carrying the one-time ticket.
pub const TICKET_PARAM: &str = "casticket";

/// One-time ticket issued by the identity provider.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Ticket(String);

impl Ticket {
    /// Wraps a raw ticket value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw ticket value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for an empty ticket.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ticket(<redacted>)")
    }
}

/// Username resolved by a successful validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wraps a username.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the username.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identity and returns the username.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Identity {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identity {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Settings fixed when the client is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// CAS application code of this client.
    #[serde(default = "default_service")]
    pub service: String,
    /// Callback URL the login service returns to. Must be identical during
    /// the login and validation steps.
    #[serde(default)]
    pub redirect_url: String,
}

impl ClientSettings {
    /// Creates settings for a callback URL and service code.
    pub fn new(redirect_url: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            redirect_url: redirect_url.into(),
        }
    }

    /// Fills an empty callback URL with `current_url`.
    #[must_use]
    pub fn or_current_url(mut self, current_url: impl Into<String>) -> Self {
        if self.redirect_url.trim().is_empty() {
            self.redirect_url = current_url.into();
        }
        self
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::new(String::new(), DEFAULT_SERVICE)
    }
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

/// Source of overridable configuration values.
///
/// Implementations are consulted on every access, so a value changed between
/// two calls is observed by the second one.
pub trait ConfigSource: Send + Sync {
    /// Returns the raw value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads configuration from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mutable in-memory configuration, mainly for embedding and tests.
#[derive(Debug, Default)]
pub struct MapConfigSource {
    values: RwLock<HashMap<String, String>>,
}

impl MapConfigSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Removes `key`.
    pub fn remove(&self, key: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

impl ConfigSource for MapConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

/// Client settings paired with a live configuration source.
#[derive(Clone)]
pub struct CasConfig {
    settings: ClientSettings,
    source: Arc<dyn ConfigSource>,
}

impl CasConfig {
    /// Creates a config over `source`.
    pub fn new(settings: ClientSettings, source: Arc<dyn ConfigSource>) -> Self {
        Self { settings, source }
    }

    /// Creates a config reading overrides from the process environment.
    pub fn from_env(settings: ClientSettings) -> Self {
        Self::new(settings, Arc::new(EnvConfigSource))
    }

    /// Fills an empty callback URL with `current_url`.
    #[must_use]
    pub fn or_current_url(mut self, current_url: impl Into<String>) -> Self {
        self.settings = self.settings.or_current_url(current_url);
        self
    }

    /// Returns the fixed client settings.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Returns the service code.
    pub fn service(&self) -> &str {
        &self.settings.service
    }

    /// Returns the callback URL.
    pub fn redirect_url(&self) -> &str {
        &self.settings.redirect_url
    }

    /// Login endpoint, `CAS_LOGIN_URL` or the default.
    pub fn login_base_url(&self) -> String {
        self.lookup(LOGIN_URL_KEY, DEFAULT_LOGIN_URL)
    }

    /// Validation endpoint, `CAS_VALIDATION_URL` or the default.
    pub fn validation_base_url(&self) -> String {
        self.lookup(VALIDATION_URL_KEY, DEFAULT_VALIDATION_URL)
    }

    /// Logout endpoint, `CAS_LOGOUT_URL` or the default.
    pub fn logout_base_url(&self) -> String {
        self.lookup(LOGOUT_URL_KEY, DEFAULT_LOGOUT_URL)
    }

    /// Session key, `CAS_SESSION_VAR` or the default.
    pub fn session_var(&self) -> String {
        self.lookup(SESSION_VAR_KEY, DEFAULT_SESSION_VAR)
    }

    /// Validation connect timeout in seconds; `0` disables the bound.
    ///
    /// An unparsable `CAS_TIMEOUT` falls back to [`DEFAULT_TIMEOUT_SECS`].
    pub fn timeout_secs(&self) -> u64 {
        let Some(raw) = self.non_empty(TIMEOUT_KEY) else {
            return DEFAULT_TIMEOUT_SECS;
        };

        match raw.trim().parse::<u64>() {
            Ok(seconds) => seconds,
            Err(error) => {
                warn!(key = TIMEOUT_KEY, %error, "ignoring unparsable timeout override");
                DEFAULT_TIMEOUT_SECS
            }
        }
    }

    fn lookup(&self, key: &str, default: &str) -> String {
        self.non_empty(key).unwrap_or_else(|| default.to_string())
    }

    fn non_empty(&self, key: &str) -> Option<String> {
        self.source.get(key).filter(|value| !value.is_empty())
    }
}

/// Converts a timeout in seconds into a connect bound; `0` means unbounded.
pub fn connect_timeout(seconds: u64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds))
}

/// Builds the login URL the caller is redirected to.
pub fn build_login_url(config: &CasConfig) -> String {
    format!(
        "{}?{SERVICE_PARAM}={}&{CALLBACK_PARAM}={}",
        config.login_base_url(),
        config.service(),
        urlencoding::encode(config.redirect_url()),
    )
}

/// Builds the validation URL for `ticket`.
///
/// The ticket is appended as-is. An empty ticket still yields a well-formed
/// URL, but the identity provider will reject it.
pub fn build_validation_url(config: &CasConfig, ticket: &Ticket) -> String {
    format!(
        "{}?{SERVICE_PARAM}={}&{CALLBACK_PARAM}={}&{TICKET_PARAM}={}",
        config.validation_base_url(),
        config.service(),
        urlencoding::encode(config.redirect_url()),
        ticket.as_str(),
    )
}

/// Builds the logout URL. No query parameters are appended.
pub fn build_logout_url(config: &CasConfig) -> String {
    config.logout_base_url()
}

/// Read access to the inbound request being served.
pub trait RequestContext: Send + Sync {
    /// Returns the decoded value of query parameter `name`.
    fn query_param(&self, name: &str) -> Option<String>;

    /// Returns the absolute URL of the request.
    fn current_url(&self) -> String;

    /// Returns the ticket returned by the login service, if any.
    fn ticket(&self) -> Option<Ticket> {
        self.query_param(TICKET_PARAM)
            .filter(|value| !value.is_empty())
            .map(Ticket::new)
    }
}

/// Plain description of an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// Whether the request arrived over TLS.
    pub https: bool,
    /// Host name, without port.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Path and query string, e.g. `/app?casticket=ST-1`.
    pub request_uri: String,
}

impl RequestInfo {
    /// Creates a request description.
    pub fn new(
        https: bool,
        host: impl Into<String>,
        port: u16,
        request_uri: impl Into<String>,
    ) -> Self {
        Self {
            https,
            host: host.into(),
            port,
            request_uri: request_uri.into(),
        }
    }

    /// Parses an absolute `http`/`https` URL.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidUrl`] when the URL does not parse, uses
    /// another scheme, or has no host.
    pub fn from_url(raw: &str) -> Result<Self, CoreError> {
        let parsed =
            Url::parse(raw).map_err(|error| CoreError::InvalidUrl(format!("{raw}: {error}")))?;

        let https = match parsed.scheme() {
            "https" => true,
            "http" => false,
            other => {
                return Err(CoreError::InvalidUrl(format!(
                    "unsupported scheme `{other}`"
                )));
            }
        };

        let host = parsed
            .host_str()
            .ok_or_else(|| CoreError::InvalidUrl(format!("{raw}: missing host")))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .unwrap_or(if https { 443 } else { 80 });

        let mut request_uri = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            request_uri.push('?');
            request_uri.push_str(query);
        }

        Ok(Self {
            https,
            host,
            port,
            request_uri,
        })
    }

    fn is_default_port(&self) -> bool {
        (self.https && self.port == 443) || (!self.https && self.port == 80)
    }
}

impl RequestContext for RequestInfo {
    fn query_param(&self, name: &str) -> Option<String> {
        let (_, query) = self.request_uri.split_once('?')?;
        let query = query.split_once('#').map_or(query, |(head, _)| head);
        url::form_urlencoded::parse(query.as_bytes())
            .find_map(|(key, value)| (key == name).then(|| value.into_owned()))
    }

    fn current_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        if self.is_default_port() {
            format!("{scheme}://{}{}", self.host, self.request_uri)
        } else {
            format!("{scheme}://{}:{}{}", self.host, self.port, self.request_uri)
        }
    }
}

/// Error type for request model failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// URL could not be interpreted as an inbound request.
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
}
