//! Integration tests for ticket redaction in echoed URLs.

use cas_client_app::redact_ticket;

#[test]
fn log_redaction_tests_removes_ticket_values() {
    let raw = "http://localhost:8123/test?next=%2Fhome&casticket=ST-123-secret";
    let redacted = redact_ticket(raw);

    assert!(!redacted.contains("ST-123-secret"));
    assert!(redacted.contains("casticket=%3Credacted%3E"));
    assert!(redacted.contains("next=%2Fhome"));
}

#[test]
fn log_redaction_tests_leaves_ticketless_input_untouched() {
    assert_eq!(
        redact_ticket("https://app.example.test/a?b=c%20d"),
        "https://app.example.test/a?b=c%20d"
    );
    assert_eq!(redact_ticket("not a url"), "not a url");
}
