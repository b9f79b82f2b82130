//! Shared fixtures for session binder integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cas_client_auth::{CasAuthenticator, MemorySessionStore};
use cas_client_core::{CasConfig, ClientSettings, MapConfigSource, RequestInfo};
use cas_client_validate::{HttpResponse, HttpTransport, TicketValidator, TransportError};

/// Callback URL used by every fixture.
pub const REDIRECT_URL: &str = "http://localhost:8123/test";

/// Transport answering every GET with a fixed body, or failing every GET.
pub struct FakeTransport {
    body: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    /// Answers every request with `body`.
    pub fn answering(body: &str) -> Self {
        Self {
            body: Some(body.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fails every request with a connect error.
    pub fn down() -> Self {
        Self {
            body: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// URLs requested so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock should work").clone()
    }
}

impl HttpTransport for FakeTransport {
    fn get(
        &self,
        url: &str,
        _connect_timeout: Option<Duration>,
    ) -> Result<HttpResponse, TransportError> {
        self.calls
            .lock()
            .expect("calls lock should work")
            .push(url.to_string());
        match &self.body {
            Some(body) => Ok(HttpResponse::ok(body.clone())),
            None => Err(TransportError::Connect("connection refused".to_string())),
        }
    }
}

/// Collaborators shared by the authenticators of one test.
pub struct Harness {
    pub source: Arc<MapConfigSource>,
    pub session: Arc<MemorySessionStore>,
    pub transport: Arc<FakeTransport>,
    pub validator: Arc<TicketValidator>,
}

impl Harness {
    /// Creates a harness over `transport`.
    pub fn new(transport: FakeTransport) -> Self {
        let transport = Arc::new(transport);
        let validator = Arc::new(TicketValidator::new(transport.clone()));
        Self {
            source: Arc::new(MapConfigSource::new()),
            session: Arc::new(MemorySessionStore::new()),
            transport,
            validator,
        }
    }

    /// Builds an authenticator serving `http://localhost:8123{request_uri}`.
    pub fn authenticator(&self, request_uri: &str) -> CasAuthenticator {
        self.authenticator_with(REDIRECT_URL, request_uri)
    }

    /// Builds an authenticator with an explicit callback URL.
    pub fn authenticator_with(&self, redirect_url: &str, request_uri: &str) -> CasAuthenticator {
        let config = CasConfig::new(
            ClientSettings::new(redirect_url, "IU"),
            self.source.clone(),
        );
        CasAuthenticator::new(
            config,
            self.validator.clone(),
            self.session.clone(),
            Arc::new(RequestInfo::new(false, "localhost", 8123, request_uri)),
        )
    }
}
