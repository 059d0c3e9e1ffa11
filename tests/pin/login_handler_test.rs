//! Token login callback behaviour.

use fipsalign::fips::SecurityConfig;
use fipsalign::pin::{CredentialRequest, PinError, PinSource, TokenLoginHandler, PIN_PROPERTY};
use fipsalign::properties::Properties;

fn no_env(_: &str) -> Option<String> {
    None
}

fn config_with_pin(property: &str) -> SecurityConfig {
    SecurityConfig::new(
        Properties::from_iter([(PIN_PROPERTY, property)]),
        Properties::new(),
    )
}

#[test]
fn pin_request_is_filled() {
    let config = config_with_pin("pin:1234");
    let handler = TokenLoginHandler::new(PinSource::with_resolver(no_env), &config);
    let mut requests = [CredentialRequest::Pin(None)];

    handler.handle(&mut requests).expect("should handle");

    let CredentialRequest::Pin(Some(pin)) = &requests[0] else {
        panic!("PIN request should be filled");
    };
    assert_eq!(pin.to_bytes().as_slice(), b"1234");
}

#[test]
fn missing_property_fills_empty_pin() {
    let config = SecurityConfig::default();
    let handler = TokenLoginHandler::new(PinSource::with_resolver(no_env), &config);
    let mut requests = [CredentialRequest::Pin(None)];

    handler.handle(&mut requests).expect("should handle");

    assert!(matches!(&requests[0], CredentialRequest::Pin(Some(pin)) if pin.is_empty()));
}

#[test]
fn non_pin_request_is_unsupported() {
    let config = config_with_pin("pin:1234");
    let handler = TokenLoginHandler::new(PinSource::with_resolver(no_env), &config);
    let mut requests = [CredentialRequest::Name {
        prompt: "user".to_owned(),
    }];

    let err = handler.handle(&mut requests).expect_err("should fail");

    assert!(matches!(err, PinError::UnsupportedRequest("name")));
}

#[test]
fn empty_request_list_is_unsupported() {
    let config = config_with_pin("pin:1234");
    let handler = TokenLoginHandler::new(PinSource::with_resolver(no_env), &config);

    let err = handler.handle(&mut []).expect_err("should fail");

    assert!(matches!(err, PinError::UnsupportedRequest(_)));
}

#[test]
fn malformed_property_surfaces_through_handler() {
    let config = config_with_pin("nocolon");
    let handler = TokenLoginHandler::new(PinSource::with_resolver(no_env), &config);
    let mut requests = [CredentialRequest::Pin(None)];

    let err = handler.handle(&mut requests).expect_err("should fail");

    assert!(matches!(err, PinError::MissingSeparator));
    assert!(matches!(&requests[0], CredentialRequest::Pin(None)));
}
