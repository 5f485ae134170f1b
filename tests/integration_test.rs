//! Integration tests for the soap-entity-endpoint crate.
//!
//! These tests exercise the public API surface end-to-end: configuration,
//! store, endpoint registration and dispatch together.

use soap_entity_endpoint::config::{EndpointConfig, PasswordType, SoapVersion};
use soap_entity_endpoint::dispatcher::{DispatchState, EndpointDispatcher, InboundMessage};
use soap_entity_endpoint::endpoint::EntityEndpoint;
use soap_entity_endpoint::error::{FaultClass, FaultCode};
use soap_entity_endpoint::parser::parse_soap_envelope;
use soap_entity_endpoint::store::{EntityRecord, EntityStore, InMemoryEntityStore, StoreError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

const ACTION: &str = "http://example.org/ws/entity/getEntity";

/// Store double counting lookups.
struct CountingStore {
    inner: InMemoryEntityStore,
    lookups: AtomicUsize,
}

impl CountingStore {
    fn new(records: Vec<EntityRecord>) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryEntityStore::from_records(records).unwrap(),
            lookups: AtomicUsize::new(0),
        })
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl EntityStore for CountingStore {
    fn find_by_id(&self, id: u64) -> Result<EntityRecord, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_id(id)
    }
}

fn dispatcher_with(config: EndpointConfig, store: Arc<CountingStore>) -> EndpointDispatcher {
    let mut dispatcher = EndpointDispatcher::new(config.clone());
    EntityEndpoint::new(store).register(&mut dispatcher, &config.service);
    dispatcher
}

fn request_11(id_element: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"
                  xmlns:ent="http://example.org/ws/entity">
  <soapenv:Header/>
  <soapenv:Body>
    <ent:getEntityRequest>
      {}
    </ent:getEntityRequest>
  </soapenv:Body>
</soapenv:Envelope>"#,
        id_element
    )
}

fn soap_11_message(body: &str) -> InboundMessage<'_> {
    InboundMessage {
        content_type: Some("text/xml; charset=utf-8"),
        soap_action: Some(ACTION),
        body: body.as_bytes(),
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_found_entity_returns_its_fields() {
    let store = CountingStore::new(vec![EntityRecord::new(1, "Test")]);
    let dispatcher = dispatcher_with(EndpointConfig::default(), store.clone());

    let body = request_11("<ent:id>1</ent:id>");
    let outcome = dispatcher.dispatch(&soap_11_message(&body));

    assert_eq!(outcome.state, DispatchState::Responded);
    assert_eq!(outcome.status, 200);
    assert!(outcome.fault.is_none());
    assert_eq!(store.lookups(), 1);

    let response = parse_soap_envelope(outcome.body.as_bytes()).unwrap();
    assert_eq!(response.version, SoapVersion::Soap11);
    assert_eq!(response.body.operation.as_deref(), Some("getEntityResponse"));
    assert!(outcome.body.contains("<ent:id>1</ent:id>"));
    assert!(outcome.body.contains("<ent:name>Test</ent:name>"));
}

#[test]
fn test_every_stored_entity_round_trips() {
    let records = vec![
        EntityRecord::new(0, "Zero"),
        EntityRecord::new(1, "Test"),
        EntityRecord::new(42, "Answer & Co"),
        EntityRecord::new(u32::MAX as u64, "Big"),
        EntityRecord::new(i64::MAX as u64 + 1, "Past signed range"),
        EntityRecord::new(u64::MAX, "Max"),
    ];
    let store = CountingStore::new(records.clone());
    let dispatcher = dispatcher_with(EndpointConfig::default(), store);

    for record in records {
        let body = request_11(&format!("<ent:id>{}</ent:id>", record.id));
        let outcome = dispatcher.dispatch(&soap_11_message(&body));
        assert_eq!(outcome.state, DispatchState::Responded, "id {}", record.id);
        assert!(outcome.body.contains(&format!("<ent:id>{}</ent:id>", record.id)));
        let escaped_name = record.name.replace('&', "&amp;");
        assert!(outcome.body.contains(&format!("<ent:name>{}</ent:name>", escaped_name)));
    }
}

#[test]
fn test_empty_store_faults_not_found() {
    let store = CountingStore::new(vec![]);
    let dispatcher = dispatcher_with(EndpointConfig::default(), store.clone());

    let body = request_11("<ent:id>1</ent:id>");
    let outcome = dispatcher.dispatch(&soap_11_message(&body));

    assert_eq!(outcome.state, DispatchState::Faulted);
    assert_eq!(outcome.status, 500);
    let fault = outcome.fault.unwrap();
    assert_eq!(fault.code, FaultCode::EntityNotFound);
    assert_eq!(fault.code.class(), FaultClass::NotFound);
    assert!(outcome.body.contains("soap:Fault"));
    assert!(outcome.body.contains("ENTITY_NOT_FOUND"));
    assert!(!outcome.body.contains("getEntityResponse"));
    assert_eq!(store.lookups(), 1);
}

#[test]
fn test_absent_ids_never_succeed() {
    let store = CountingStore::new(vec![EntityRecord::new(1, "Test")]);
    let dispatcher = dispatcher_with(EndpointConfig::default(), store);

    for id in [0u64, 2, 100, u64::MAX >> 1] {
        let body = request_11(&format!("<ent:id>{}</ent:id>", id));
        let outcome = dispatcher.dispatch(&soap_11_message(&body));
        assert!(outcome.is_fault(), "id {} should fault", id);
        assert_eq!(outcome.fault.unwrap().code, FaultCode::EntityNotFound);
    }
}

#[test]
fn test_non_integer_id_faults_before_store() {
    let store = CountingStore::new(vec![EntityRecord::new(1, "Test")]);
    let dispatcher = dispatcher_with(EndpointConfig::default(), store.clone());

    let body = request_11("<ent:id>one</ent:id>");
    let outcome = dispatcher.dispatch(&soap_11_message(&body));

    let fault = outcome.fault.unwrap();
    assert_eq!(fault.code, FaultCode::MalformedRequest);
    assert_eq!(fault.code.class(), FaultClass::MalformedRequest);
    assert!(outcome.body.contains("MALFORMED_REQUEST"));
    assert_eq!(store.lookups(), 0);
}

#[test]
fn test_structurally_invalid_requests_fault_before_store() {
    let store = CountingStore::new(vec![EntityRecord::new(1, "Test")]);
    let dispatcher = dispatcher_with(EndpointConfig::default(), store.clone());

    let cases = [
        ("missing id", request_11("")),
        ("empty id", request_11("<ent:id></ent:id>")),
        ("self-closing id", request_11("<ent:id/>")),
        ("negative id", request_11("<ent:id>-1</ent:id>")),
        ("decimal id", request_11("<ent:id>1.0</ent:id>")),
        ("wrong field", request_11("<ent:identifier>1</ent:identifier>")),
    ];

    for (name, body) in cases {
        let outcome = dispatcher.dispatch(&soap_11_message(&body));
        assert_eq!(
            outcome.fault.map(|f| f.code),
            Some(FaultCode::MalformedRequest),
            "case: {}",
            name
        );
    }
    assert_eq!(store.lookups(), 0);
}

#[test]
fn test_malformed_and_not_found_codes_differ() {
    let store = CountingStore::new(vec![]);
    let dispatcher = dispatcher_with(EndpointConfig::default(), store);

    let malformed = request_11("<ent:id>x</ent:id>");
    let missing = request_11("<ent:id>9</ent:id>");
    let a = dispatcher.dispatch(&soap_11_message(&malformed)).fault.unwrap();
    let b = dispatcher.dispatch(&soap_11_message(&missing)).fault.unwrap();
    assert_ne!(a.code, b.code);
}

// ============================================================================
// Envelope-level rejection
// ============================================================================

#[test]
fn test_xxe_rejected_before_store() {
    let store = CountingStore::new(vec![EntityRecord::new(1, "Test")]);
    let dispatcher = dispatcher_with(EndpointConfig::default(), store.clone());

    let body = r#"<?xml version="1.0"?>
<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <ent:getEntityRequest xmlns:ent="http://example.org/ws/entity"><ent:id>&xxe;</ent:id></ent:getEntityRequest>
  </soap:Body>
</soap:Envelope>"#;
    let outcome = dispatcher.dispatch(&soap_11_message(body));

    assert_eq!(outcome.fault.unwrap().code, FaultCode::DoctypeDetected);
    assert_eq!(store.lookups(), 0);
}

#[test]
fn test_not_soap_rejected() {
    let store = CountingStore::new(vec![EntityRecord::new(1, "Test")]);
    let dispatcher = dispatcher_with(EndpointConfig::default(), store.clone());

    let outcome = dispatcher.dispatch(&soap_11_message("<getEntityRequest><id>1</id></getEntityRequest>"));
    assert_eq!(outcome.fault.unwrap().code, FaultCode::MissingEnvelope);
    assert_eq!(store.lookups(), 0);
}

#[test]
fn test_soap_action_mismatch_rejected() {
    let store = CountingStore::new(vec![EntityRecord::new(1, "Test")]);
    let dispatcher = dispatcher_with(EndpointConfig::default(), store.clone());

    let body = request_11("<ent:id>1</ent:id>");
    let outcome = dispatcher.dispatch(&InboundMessage {
        content_type: Some("text/xml"),
        soap_action: Some("\"http://example.org/ws/entity/deleteEntity\""),
        body: body.as_bytes(),
    });
    assert_eq!(outcome.fault.unwrap().code, FaultCode::SoapActionMismatch);
    assert_eq!(store.lookups(), 0);
}

#[test]
fn test_soap_12_request_gets_soap_12_response() {
    let store = CountingStore::new(vec![EntityRecord::new(1, "Test")]);
    let dispatcher = dispatcher_with(EndpointConfig::default(), store);

    let request = |id: &str| {
        format!(
            r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope">
  <env:Body>
    <getEntityRequest xmlns="http://example.org/ws/entity"><id>{}</id></getEntityRequest>
  </env:Body>
</env:Envelope>"#,
            id
        )
    };

    let ok_body = request("1");
    let ok = dispatcher.dispatch(&InboundMessage {
        content_type: Some("application/soap+xml; charset=utf-8"),
        soap_action: None,
        body: ok_body.as_bytes(),
    });
    assert_eq!(ok.state, DispatchState::Responded);
    assert_eq!(ok.content_type, "application/soap+xml; charset=utf-8");
    assert_eq!(
        parse_soap_envelope(ok.body.as_bytes()).unwrap().version,
        SoapVersion::Soap12
    );

    let missing_body = request("2");
    let missing = dispatcher.dispatch(&InboundMessage {
        content_type: Some("application/soap+xml"),
        soap_action: None,
        body: missing_body.as_bytes(),
    });
    assert!(missing.is_fault());
    assert!(missing.body.contains("<soap:Value>soap:Sender</soap:Value>"));
}

// ============================================================================
// Configuration-driven wiring
// ============================================================================

#[test]
fn test_yaml_config_with_ws_security() {
    let yaml = r#"
service:
  namespace: "urn:test:entity"
  soap_action: "urn:test:entity:get"
ws_security:
  enabled: true
  require_username_token: true
  allowed_password_types:
    - PasswordText
store:
  entities:
    - id: 1
      name: Test
"#;
    let config: EndpointConfig = serde_yaml::from_str(yaml).unwrap();
    config.validate().unwrap();
    assert_eq!(config.ws_security.allowed_password_types, vec![PasswordType::PasswordText]);

    let store = CountingStore::new(config.store.entities.clone());
    let dispatcher = dispatcher_with(config, store.clone());

    let unsecured = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body><t:getEntityRequest xmlns:t="urn:test:entity"><t:id>1</t:id></t:getEntityRequest></soap:Body>
</soap:Envelope>"#;
    let rejected = dispatcher.dispatch(&InboundMessage {
        content_type: Some("text/xml"),
        soap_action: Some("urn:test:entity:get"),
        body: unsecured.as_bytes(),
    });
    assert_eq!(rejected.fault.unwrap().code, FaultCode::SecurityHeaderRejected);
    assert_eq!(store.lookups(), 0);

    let secured = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"
    xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">
  <soap:Header>
    <wsse:Security soap:mustUnderstand="1">
      <wsse:UsernameToken>
        <wsse:Username>myUser</wsse:Username>
        <wsse:Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText">myPassword</wsse:Password>
      </wsse:UsernameToken>
    </wsse:Security>
  </soap:Header>
  <soap:Body><t:getEntityRequest xmlns:t="urn:test:entity"><t:id>1</t:id></t:getEntityRequest></soap:Body>
</soap:Envelope>"#;
    let accepted = dispatcher.dispatch(&InboundMessage {
        content_type: Some("text/xml"),
        soap_action: Some("urn:test:entity:get"),
        body: secured.as_bytes(),
    });
    assert_eq!(accepted.state, DispatchState::Responded);
    assert!(accepted.body.contains("xmlns:ent=\"urn:test:entity\""));
    assert_eq!(store.lookups(), 1);
}

#[test]
fn test_concurrent_dispatch() {
    let store = CountingStore::new((0..16).map(|i| EntityRecord::new(i, format!("e{}", i))).collect());
    let dispatcher = Arc::new(dispatcher_with(EndpointConfig::default(), store.clone()));

    let handles: Vec<_> = (0..16u64)
        .map(|id| {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || {
                let body = request_11(&format!("<ent:id>{}</ent:id>", id));
                let outcome = dispatcher.dispatch(&soap_11_message(&body));
                assert!(outcome.body.contains(&format!("<ent:name>e{}</ent:name>", id)));
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.lookups(), 16);
    assert_eq!(dispatcher.metrics().requests_processed, 16);
    assert_eq!(dispatcher.metrics().faults_returned, 0);
}
