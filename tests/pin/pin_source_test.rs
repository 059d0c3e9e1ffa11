//! PIN property resolution across schemes.

use std::fs;

use fipsalign::fips::SecurityConfig;
use fipsalign::pin::{PinError, PinSource, PIN_FILE_READ_LIMIT, PIN_PROPERTY};
use fipsalign::properties::Properties;

fn resolver(key: &str) -> Option<String> {
    match key {
        "NSS_PIN" => Some("from-env".to_owned()),
        "EMPTY_PIN" => Some(String::new()),
        _ => None,
    }
}

fn source() -> PinSource<fn(&str) -> Option<String>> {
    PinSource::with_resolver(resolver)
}

#[test]
fn literal_pin_round_trips_to_bytes() {
    let pin = source().resolve(Some("PIN:secret")).expect("should resolve");
    assert_eq!(pin.len(), 6);
    assert_eq!(pin.to_bytes().as_slice(), b"secret");
}

#[test]
fn literal_pin_may_contain_colons() {
    let pin = source().resolve(Some("pin:a:b")).expect("should resolve");
    assert_eq!(pin.to_bytes().as_slice(), b"a:b");
}

#[test]
fn env_scheme_uses_resolver() {
    let pin = source().resolve(Some("env:NSS_PIN")).expect("should resolve");
    assert_eq!(pin.to_bytes().as_slice(), b"from-env");
}

#[test]
fn unset_or_empty_env_variable_yields_empty_pin() {
    for property in ["ENV:UNSET_PIN", "ENV:EMPTY_PIN"] {
        let pin = source().resolve(Some(property)).expect("should resolve");
        assert!(pin.is_empty(), "{property} should yield an empty PIN");
    }
}

#[test]
fn file_scheme_reads_first_line_only() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("pin.txt");
    fs::write(&path, "hello\nworld\n").expect("should write pin file");

    let pin = source()
        .resolve(Some(&format!("FILE:{}", path.display())))
        .expect("should resolve");

    assert_eq!(pin.to_bytes().as_slice(), b"hello");
}

#[test]
fn file_with_empty_first_line_yields_empty_pin() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("pin.txt");
    fs::write(&path, "\nsecond\n").expect("should write pin file");

    let pin = source()
        .resolve(Some(&format!("file:{}", path.display())))
        .expect("should resolve");

    assert!(pin.is_empty());
}

#[test]
fn long_first_line_is_cut_at_read_limit() {
    let limit = usize::try_from(PIN_FILE_READ_LIMIT).expect("limit should fit in usize");
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("pin.txt");
    let mut content = "a".repeat(limit - 1);
    content.push_str("é");
    content.push_str("tail\n");
    fs::write(&path, content).expect("should write pin file");

    let pin = source()
        .resolve(Some(&format!("file:{}", path.display())))
        .expect("should resolve");

    // The two-byte character straddles the limit and decodes as U+FFFD.
    assert_eq!(pin.len(), limit + 2);
    let bytes = pin.to_bytes();
    assert!(bytes[..limit - 1].iter().all(|b| *b == b'a'));
    assert_eq!(&bytes[limit - 1..], &[0xEF, 0xBF, 0xBD]);
}

#[test]
fn missing_pin_file_reports_path() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("absent");

    let err = source()
        .resolve(Some(&format!("FILE:{}", path.display())))
        .expect_err("should fail");

    assert!(matches!(err, PinError::File { .. }));
    assert!(err.to_string().contains("absent"));
}

#[test]
fn absent_or_empty_property_yields_empty_pin() {
    assert!(source().resolve(None).expect("should resolve").is_empty());
    assert!(source().resolve(Some("")).expect("should resolve").is_empty());
}

#[test]
fn unknown_scheme_is_rejected() {
    let err = source().resolve(Some("BOGUS:x")).expect_err("should fail");
    assert!(matches!(err, PinError::UnsupportedScheme { ref scheme } if scheme == "BOGUS"));
}

#[test]
fn missing_separator_is_rejected() {
    let err = source().resolve(Some("secret")).expect_err("should fail");
    assert!(matches!(err, PinError::MissingSeparator));
}

#[test]
fn system_property_overrides_security_property() {
    let config = SecurityConfig::new(
        Properties::from_iter([(PIN_PROPERTY, "pin:from-security")]),
        Properties::from_iter([(PIN_PROPERTY, "pin:from-system")]),
    );

    let pin = source().resolve_from(&config).expect("should resolve");

    assert_eq!(pin.to_bytes().as_slice(), b"from-system");
}

#[test]
fn debug_output_never_shows_the_pin() {
    let pin = source().resolve(Some("PIN:hunter2")).expect("should resolve");
    let rendered = format!("{pin:?}");
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("REDACTED"));
}

#[cfg(unix)]
#[test]
fn process_env_with_invalid_utf8_is_decoded_lossily() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let key = "FIPSALIGN_TEST_NON_UTF8_PIN";
    std::env::set_var(key, OsStr::from_bytes(&[b'a', 0xFF, b'b']));

    let pin = PinSource::from_env()
        .resolve(Some(&format!("env:{key}")))
        .expect("should resolve");
    std::env::remove_var(key);

    assert_eq!(pin.to_bytes().as_slice(), &[b'a', 0xEF, 0xBF, 0xBD, b'b']);
}
