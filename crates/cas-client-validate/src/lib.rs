#![warn(missing_docs)]
//! # cas-client-validate
//!
//! ## Purpose
//! Exchanges a one-time CAS ticket for the username it was issued to.
//!
//! ## Responsibilities
//! - Issue the validation GET through an injectable [`HttpTransport`].
//! - Parse the two-line `yes`/`no` validation answer.
//! - Refuse to resubmit a recently validated ticket.
//! - Report transport failures to an optional [`LogSink`], or to `tracing`
//!   when none is attached.
//!
//! ## Data flow
//! Session binder reads a [`Ticket`] -> [`TicketValidator::validate`] builds
//! the validation URL and calls [`HttpTransport::get`] ->
//! [`parse_validation_response`] yields an [`Identity`] or `None`.
//!
//! ## Ownership and lifetimes
//! Transport and log sink are shared trait objects (`Arc`) so one validator
//! can serve every request of an application. The consumed-ticket ledger is
//! bounded: once it holds [`DEFAULT_LEDGER_CAPACITY`] tickets (or the
//! configured capacity) the oldest entry is evicted for each new one.
//!
//! ## Error model
//! Validation never fails loudly. A `no` answer, a malformed body, a
//! transport error, a timeout and a reused ticket all resolve to `None`. Only
//! the logs distinguish them.
//!
//! ## Security and privacy notes
//! Response bodies and identities are never logged. The validation URL,
//! which embeds the ticket, is logged on transport failure for diagnostics.
//! A ticket is never resubmitted while it is still in the ledger.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cas_client_core::{CasConfig, Identity, Ticket, build_validation_url, connect_timeout};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Answer token of a successful validation.
pub const VALIDATION_ACCEPTED: &str = "yes";

/// Number of consumed tickets remembered by a [`TicketValidator`].
pub const DEFAULT_LEDGER_CAPACITY: usize = 4096;

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    /// Creates a `200 OK` response with `body`.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstract HTTP client used for validation and logout calls.
pub trait HttpTransport: Send + Sync {
    /// Performs one GET request.
    ///
    /// `connect_timeout` bounds connection establishment; `None` leaves it
    /// unbounded.
    ///
    /// # Errors
    /// Returns [`TransportError`] when no response body could be obtained.
    fn get(
        &self,
        url: &str,
        connect_timeout: Option<Duration>,
    ) -> Result<HttpResponse, TransportError>;
}

/// Consumer of critical diagnostics.
pub trait LogSink: Send + Sync {
    /// Records a critical message.
    fn critical(&self, message: &str);
}

/// [`LogSink`] that forwards to `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn critical(&self, message: &str) {
        error!("{message}");
    }
}

/// Blocking `reqwest` transport.
///
/// A client is built per call so each request can carry its own connect
/// timeout; at most one call is made per inbound request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    /// Creates a transport with reqwest's default overall request timeout.
    pub fn new() -> Self {
        Self
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(
        &self,
        url: &str,
        connect_timeout: Option<Duration>,
    ) -> Result<HttpResponse, TransportError> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        let client = builder.build().map_err(TransportError::from_reqwest)?;
        let response = client.get(url).send().map_err(TransportError::from_reqwest)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(TransportError::from_reqwest)?;

        Ok(HttpResponse { status, body })
    }
}

/// Parses a validation answer body.
///
/// The body is split on the first newline. Two parts are required and the
/// trimmed first part must be `yes`; the trimmed second part is the username.
/// Every other shape, including an empty username, is a rejection.
pub fn parse_validation_response(body: &str) -> Option<Identity> {
    let (answer, rest) = body.split_once('\n')?;
    if answer.trim() != VALIDATION_ACCEPTED {
        return None;
    }

    let name = rest.trim();
    if name.is_empty() {
        return None;
    }

    Some(Identity::new(name))
}

/// Fixed-capacity set of submitted tickets, evicting in insertion order.
#[derive(Debug)]
struct TicketLedger {
    seen: HashSet<Ticket>,
    order: VecDeque<Ticket>,
    capacity: usize,
}

impl TicketLedger {
    fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Records `ticket`; returns `false` if it is already present.
    fn insert(&mut self, ticket: &Ticket) -> bool {
        if self.seen.contains(ticket) {
            return false;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(ticket.clone());
        self.order.push_back(ticket.clone());
        true
    }

    fn contains(&self, ticket: &Ticket) -> bool {
        self.seen.contains(ticket)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Resolves tickets into identities against the CAS validation endpoint.
pub struct TicketValidator {
    transport: Arc<dyn HttpTransport>,
    log_sink: Option<Arc<dyn LogSink>>,
    consumed: Mutex<TicketLedger>,
}

impl TicketValidator {
    /// Creates a validator without a log sink, remembering up to
    /// [`DEFAULT_LEDGER_CAPACITY`] consumed tickets.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            log_sink: None,
            consumed: Mutex::new(TicketLedger::with_capacity(DEFAULT_LEDGER_CAPACITY)),
        }
    }

    /// Replaces the ledger with one remembering at most `capacity` tickets.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn with_ledger_capacity(self, capacity: usize) -> Self {
        Self {
            consumed: Mutex::new(TicketLedger::with_capacity(capacity)),
            ..self
        }
    }

    /// Attaches a sink for critical transport diagnostics.
    #[must_use]
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Validates `ticket` and returns the identity it was issued to.
    ///
    /// Issues exactly one GET unless the ticket is still in the ledger, in
    /// which case no request is made. `timeout_secs == 0` disables the
    /// connect bound. Never retries.
    pub fn validate(
        &self,
        config: &CasConfig,
        ticket: &Ticket,
        timeout_secs: u64,
    ) -> Option<Identity> {
        if !self.consume(ticket) {
            debug!("ticket already submitted; refusing to validate it again");
            return None;
        }

        let url = build_validation_url(config, ticket);
        let response = match self.transport.get(&url, connect_timeout(timeout_secs)) {
            Ok(response) => response,
            Err(transport_error) => {
                self.report(&format!(
                    "ticket validation request to {url} failed: {transport_error}"
                ));
                return None;
            }
        };

        if !response.is_success() {
            debug!(
                status = response.status,
                "validation endpoint answered with non-success status"
            );
        }

        let identity = parse_validation_response(&response.body);
        debug!(accepted = identity.is_some(), "ticket validation completed");
        identity
    }

    /// Sends a best-effort GET to `logout_url`.
    ///
    /// Returns `true` when the provider answered with a 2xx status. Failures
    /// are logged and never raised.
    pub fn notify_logout(&self, logout_url: &str, timeout_secs: u64) -> bool {
        match self.transport.get(logout_url, connect_timeout(timeout_secs)) {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                warn!(url = %logout_url, status = response.status, "logout notification rejected");
                false
            }
            Err(transport_error) => {
                self.report(&format!(
                    "logout notification to {logout_url} failed: {transport_error}"
                ));
                false
            }
        }
    }

    /// Returns `true` if `ticket` was submitted and is still remembered.
    pub fn is_consumed(&self, ticket: &Ticket) -> bool {
        self.ledger().contains(ticket)
    }

    /// Returns how many consumed tickets are currently remembered.
    pub fn consumed_count(&self) -> usize {
        self.ledger().len()
    }

    fn consume(&self, ticket: &Ticket) -> bool {
        self.ledger().insert(ticket)
    }

    fn ledger(&self) -> MutexGuard<'_, TicketLedger> {
        self.consumed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends `message` to the sink, or to `tracing` when no sink is attached.
    fn report(&self, message: &str) {
        match &self.log_sink {
            Some(sink) => sink.critical(message),
            None => error!("{message}"),
        }
    }
}

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connect or request deadline elapsed.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),
    /// Any other request failure.
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else {
            Self::Request(error.to_string())
        }
    }
}
