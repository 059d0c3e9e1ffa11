//! Probes plugged into the configurator.

use std::fs;

use fipsalign::fips::{FipsConfigurator, FipsError, FipsProbe, PolicyFileProbe, SecurityConfig};

#[cfg(not(feature = "nss"))]
mod native {
    use super::*;
    use fipsalign_probe::{NativeProbe, ProbeError};

    fn status_probe(contents: &[u8]) -> (tempfile::TempDir, NativeProbe) {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("fips_enabled");
        fs::write(&path, contents).expect("should write status file");
        let probe = NativeProbe::new()
            .with_library_names(Vec::<String>::new())
            .with_status_path(path);
        (dir, probe)
    }

    #[test]
    fn status_one_is_enabled() {
        let (_dir, probe) = status_probe(b"1\n");
        assert!(FipsProbe::probe(&probe).expect("should probe"));
    }

    #[test]
    fn status_zero_is_disabled() {
        let (_dir, probe) = status_probe(b"0\n");
        assert!(!FipsProbe::probe(&probe).expect("should probe"));
    }

    #[test]
    fn empty_status_file_fails_the_probe() {
        let (_dir, probe) = status_probe(b"");
        let err = FipsProbe::probe(&probe).expect_err("should fail");
        assert!(matches!(err, FipsError::Probe(ProbeError::Empty { .. })));
    }

    #[test]
    fn missing_status_file_aborts_configuration() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let probe = NativeProbe::new()
            .with_library_names(Vec::<String>::new())
            .with_status_path(dir.path().join("absent"));
        let mut config = SecurityConfig::default();

        let result = FipsConfigurator::new(probe, dir.path().join("java.config"))
            .configure(&mut config);

        assert!(matches!(
            result,
            Err(FipsError::Probe(ProbeError::Open { .. }))
        ));
    }

    #[test]
    fn native_probe_drives_provider_rewrite() {
        let (dir, probe) = status_probe(b"1");
        let base = dir.path().join("java.config");
        fs::write(&base, "security.provider.1=SUN\nfips.provider.1=SunPKCS11\n")
            .expect("should write base file");
        let mut config = SecurityConfig::default();

        let out = FipsConfigurator::new(probe, &base)
            .configure(&mut config)
            .expect("should configure");

        assert!(out.state.enabled());
        assert_eq!(config.security.get("security.provider.1"), Some("SunPKCS11"));
    }
}

#[test]
fn boxed_probe_is_usable_by_the_configurator() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let policy = dir.path().join("config");
    fs::write(&policy, "FIPS\n").expect("should write policy");
    let probe: Box<dyn FipsProbe> = Box::new(PolicyFileProbe::new(&policy));
    let mut config = SecurityConfig::default();

    let out = FipsConfigurator::new(probe, dir.path().join("absent.config"))
        .configure(&mut config)
        .expect("should configure");

    assert!(out.state.enabled());
    assert!(out.state.plain_key_support_enabled());
}

#[test]
fn default_policy_probe_points_at_system_state_file() {
    assert_eq!(
        PolicyFileProbe::default().path(),
        std::path::Path::new(PolicyFileProbe::DEFAULT_PATH)
    );
}
