//! Importer key creation under concurrent imports.

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

use fipsalign::import::{ImporterKeyState, KeyImporter};
use fipsalign::token::{AttributeSet, AttributeType, KeyClass, KeyType, SoftToken, Token};

const THREADS: usize = 16;

fn secret_key(fill: u8) -> AttributeSet {
    AttributeSet::new()
        .with(AttributeType::Class, KeyClass::SecretKey)
        .with(AttributeType::KeyType, KeyType::GenericSecret)
        .with(AttributeType::Value, vec![fill; 24])
}

fn setup() -> (Arc<SoftToken>, KeyImporter<Arc<SoftToken>>) {
    let token = Arc::new(SoftToken::default());
    (Arc::clone(&token), KeyImporter::new(token))
}

#[test]
fn concurrent_imports_share_one_importer_key() {
    let (token, importer) = setup();
    let barrier = Barrier::new(THREADS);

    let handles: Vec<_> = thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|i| {
                let importer = &importer;
                let token = &token;
                let barrier = &barrier;
                s.spawn(move || {
                    let session = token.open_object_session().expect("should open session");
                    let fill = u8::try_from(i).expect("thread index fits in u8");
                    barrier.wait();
                    let result = importer.import_key(session, &secret_key(fill));
                    token.release_session(session);
                    result.expect("import should succeed")
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().expect("worker should not panic"))
            .collect()
    });

    assert_eq!(token.generate_calls(), 1);
    assert_eq!(token.unwrap_calls(), THREADS);
    assert_eq!(importer.importer_key_state(), ImporterKeyState::Ready);
    assert_eq!(importer.active_importer_leases(), 0);
    assert_eq!(token.sessions_in_use(), 0);

    let distinct: BTreeSet<_> = handles.iter().collect();
    assert_eq!(distinct.len(), THREADS);
}

#[test]
fn failed_importer_key_is_never_retried() {
    let (token, importer) = setup();
    token.fail_key_generation(true);
    let session = token.open_object_session().expect("should open session");

    for _ in 0..100 {
        let err = importer
            .import_key(session, &secret_key(1))
            .expect_err("import should fail");
        assert_eq!(err.to_string(), "CKR_GENERAL_ERROR");
    }

    assert_eq!(token.generate_calls(), 1);
    assert_eq!(token.unwrap_calls(), 0);
    assert_eq!(importer.importer_key_state(), ImporterKeyState::Failed);

    token.fail_key_generation(false);
    importer
        .import_key(session, &secret_key(1))
        .expect_err("failure should be permanent");
    assert_eq!(token.generate_calls(), 1);
}

#[test]
fn concurrent_failures_attempt_generation_once() {
    let (token, importer) = setup();
    token.fail_key_generation(true);
    let barrier = Barrier::new(THREADS);

    let failures = thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let importer = &importer;
                let token = &token;
                let barrier = &barrier;
                s.spawn(move || {
                    let session = token.open_object_session().expect("should open session");
                    barrier.wait();
                    let result = importer.import_key(session, &secret_key(9));
                    token.release_session(session);
                    result.is_err()
                })
            })
            .collect::<Vec<_>>();
        workers
            .into_iter()
            .map(|w| w.join().expect("worker should not panic"))
            .filter(|failed| *failed)
            .count()
    });

    assert_eq!(failures, THREADS);
    assert_eq!(token.generate_calls(), 1);
    assert_eq!(importer.importer_key_state(), ImporterKeyState::Failed);
    assert_eq!(importer.active_importer_leases(), 0);
}

#[test]
fn state_is_not_attempted_before_first_import() {
    let (token, importer) = setup();
    assert_eq!(importer.importer_key_state(), ImporterKeyState::NotAttempted);
    assert_eq!(token.generate_calls(), 0);
}
