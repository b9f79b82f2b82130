//! Integration tests for ticket validation semantics.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cas_client_core::{
    CasConfig, ClientSettings, Identity, MapConfigSource, Ticket, build_validation_url,
};
use cas_client_validate::{
    DEFAULT_LEDGER_CAPACITY, HttpResponse, HttpTransport, LogSink, TicketValidator, TransportError,
};

#[derive(Default)]
struct ScriptedTransport {
    body: Option<String>,
    calls: Mutex<Vec<(String, Option<Duration>)>>,
}

impl ScriptedTransport {
    fn answering(body: &str) -> Self {
        Self {
            body: Some(body.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self::default()
    }

    fn calls(&self) -> Vec<(String, Option<Duration>)> {
        self.calls.lock().expect("calls lock should work").clone()
    }
}

impl HttpTransport for ScriptedTransport {
    fn get(
        &self,
        url: &str,
        connect_timeout: Option<Duration>,
    ) -> Result<HttpResponse, TransportError> {
        self.calls
            .lock()
            .expect("calls lock should work")
            .push((url.to_string(), connect_timeout));
        match &self.body {
            Some(body) => Ok(HttpResponse::ok(body.clone())),
            None => Err(TransportError::Connect("connection refused".to_string())),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl LogSink for RecordingSink {
    fn critical(&self, message: &str) {
        self.messages
            .lock()
            .expect("sink lock should work")
            .push(message.to_string());
    }
}

fn config() -> CasConfig {
    CasConfig::new(
        ClientSettings::new("http://localhost:8123/test", "IU"),
        Arc::new(MapConfigSource::new()),
    )
}

#[test]
fn validator_tests_accepts_yes_answer() {
    let transport = Arc::new(ScriptedTransport::answering("yes\ntest_user\n"));
    let validator = TicketValidator::new(transport.clone());
    let ticket = Ticket::new("ST-1");

    let identity = validator.validate(&config(), &ticket, 5);

    assert_eq!(identity, Some(Identity::new("test_user")));
    assert_eq!(
        transport.calls(),
        vec![(build_validation_url(&config(), &ticket), Some(Duration::from_secs(5)))]
    );
}

#[test]
fn validator_tests_rejects_no_and_single_line_answers() {
    for body in ["no\n\n", "yes", "no", ""] {
        let validator = TicketValidator::new(Arc::new(ScriptedTransport::answering(body)));
        assert_eq!(validator.validate(&config(), &Ticket::new("ST-2"), 5), None);
    }
}

#[test]
fn validator_tests_zero_timeout_disables_connect_bound() {
    let transport = Arc::new(ScriptedTransport::answering("yes\nalice\n"));
    let validator = TicketValidator::new(transport.clone());

    validator.validate(&config(), &Ticket::new("ST-3"), 0);

    assert_eq!(transport.calls()[0].1, None);
}

#[test]
fn validator_tests_never_resubmits_a_ticket() {
    let transport = Arc::new(ScriptedTransport::answering("yes\nalice\n"));
    let validator = TicketValidator::new(transport.clone());
    let ticket = Ticket::new("ST-4");

    assert!(validator.validate(&config(), &ticket, 5).is_some());
    assert!(validator.is_consumed(&ticket));
    assert_eq!(validator.validate(&config(), &ticket, 5), None);
    assert_eq!(transport.calls().len(), 1);
}

#[test]
fn validator_tests_failed_ticket_is_also_consumed() {
    let transport = Arc::new(ScriptedTransport::failing());
    let validator = TicketValidator::new(transport.clone());
    let ticket = Ticket::new("ST-5");

    assert_eq!(validator.validate(&config(), &ticket, 5), None);
    assert_eq!(validator.validate(&config(), &ticket, 5), None);
    assert_eq!(transport.calls().len(), 1);
}

#[test]
fn validator_tests_transport_failure_reaches_log_sink() {
    let sink = Arc::new(RecordingSink::default());
    let validator =
        TicketValidator::new(Arc::new(ScriptedTransport::failing())).with_log_sink(sink.clone());
    let ticket = Ticket::new("ST-6");

    assert_eq!(validator.validate(&config(), &ticket, 5), None);

    let messages = sink.messages.lock().expect("sink lock should work").clone();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains(&build_validation_url(&config(), &ticket)));
    assert!(messages[0].contains("connection refused"));
}

#[test]
fn validator_tests_rejection_is_not_reported_to_sink() {
    let sink = Arc::new(RecordingSink::default());
    let validator = TicketValidator::new(Arc::new(ScriptedTransport::answering("no\n\n")))
        .with_log_sink(sink.clone());

    assert_eq!(validator.validate(&config(), &Ticket::new("ST-7"), 5), None);
    assert!(sink.messages.lock().expect("sink lock should work").is_empty());
}

#[test]
fn validator_tests_logout_notification_degrades_to_false() {
    let sink = Arc::new(RecordingSink::default());
    let validator =
        TicketValidator::new(Arc::new(ScriptedTransport::failing())).with_log_sink(sink.clone());

    assert!(!validator.notify_logout("https://cas.example.test/logout", 5));
    assert_eq!(sink.messages.lock().expect("sink lock should work").len(), 1);

    let ok = TicketValidator::new(Arc::new(ScriptedTransport::answering("")));
    assert!(ok.notify_logout("https://cas.example.test/logout", 5));
}

#[test]
fn validator_tests_ledger_releases_old_tickets() {
    let transport = Arc::new(ScriptedTransport::answering("yes\nalice\n"));
    let validator = TicketValidator::new(transport.clone()).with_ledger_capacity(16);

    for index in 0..1_000 {
        validator.validate(&config(), &Ticket::new(format!("ST-{index}")), 5);
    }

    assert_eq!(validator.consumed_count(), 16);
    assert!(!validator.is_consumed(&Ticket::new("ST-0")));
    assert!(validator.is_consumed(&Ticket::new("ST-999")));
    assert_eq!(validator.validate(&config(), &Ticket::new("ST-999"), 5), None);
    assert_eq!(transport.calls().len(), 1_000);
}

#[test]
fn validator_tests_default_ledger_is_bounded() {
    let validator = TicketValidator::new(Arc::new(ScriptedTransport::answering("no\n\n")));

    for index in 0..(DEFAULT_LEDGER_CAPACITY + 100) {
        validator.validate(&config(), &Ticket::new(format!("ST-{index}")), 5);
    }

    assert_eq!(validator.consumed_count(), DEFAULT_LEDGER_CAPACITY);
}
