//! Integration tests for the blocking HTTP transport against a mock provider.

use std::sync::Arc;

use cas_client_core::{
    CasConfig, ClientSettings, Identity, MapConfigSource, Ticket, VALIDATION_URL_KEY,
};
use cas_client_validate::{HttpTransport, ReqwestTransport, TicketValidator, TransportError};
use mockito::Matcher;

fn config_for(validation_base: &str) -> CasConfig {
    let source = Arc::new(MapConfigSource::new());
    source.set(VALIDATION_URL_KEY, validation_base);
    CasConfig::new(ClientSettings::new("http://localhost:8123/test", "IU"), source)
}

#[test]
fn reqwest_transport_tests_validates_against_provider() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/cas/validate")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("cassvc".into(), "IU".into()),
            Matcher::UrlEncoded("casurl".into(), "http://localhost:8123/test".into()),
            Matcher::UrlEncoded("casticket".into(), "ST-100".into()),
        ]))
        .with_status(200)
        .with_body("yes\nalice\n")
        .create();

    let validator = TicketValidator::new(Arc::new(ReqwestTransport::new()));
    let config = config_for(&format!("{}/cas/validate", server.url()));

    let identity = validator.validate(&config, &Ticket::new("ST-100"), 5);

    mock.assert();
    assert_eq!(identity, Some(Identity::new("alice")));
}

#[test]
fn reqwest_transport_tests_provider_rejection_is_none() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/cas/validate")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("no\n\n")
        .create();

    let validator = TicketValidator::new(Arc::new(ReqwestTransport::new()));
    let config = config_for(&format!("{}/cas/validate", server.url()));

    assert_eq!(validator.validate(&config, &Ticket::new("ST-101"), 5), None);
    mock.assert();
}

#[test]
fn reqwest_transport_tests_unreachable_provider_is_an_error() {
    let transport = ReqwestTransport::new();
    let result = transport.get(
        "http://127.0.0.1:9/cas/validate",
        Some(std::time::Duration::from_secs(1)),
    );

    assert!(matches!(
        result,
        Err(TransportError::Connect(_) | TransportError::Timeout(_) | TransportError::Request(_))
    ));
}

#[test]
fn reqwest_transport_tests_unreachable_provider_validates_to_none() {
    let validator = TicketValidator::new(Arc::new(ReqwestTransport::new()));
    let config = config_for("http://127.0.0.1:9/cas/validate");

    assert_eq!(validator.validate(&config, &Ticket::new("ST-102"), 1), None);
}
