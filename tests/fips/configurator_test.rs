//! End-to-end FIPS alignment against on-disk crypto-policies files.

use std::fs;
use std::path::{Path, PathBuf};

use fipsalign::fips::{
    FipsConfigurator, FipsError, FipsState, PolicyFileProbe, SecurityConfig,
    SECURITY_PROVIDER_PREFIX,
};
use fipsalign::properties::Properties;

const JAVA_CONFIG: &str = "\
# Generated by crypto-policies
security.provider.1=SUN
security.provider.2=SunRsaSign
security.provider.3=SunEC
security.provider.4=SunJSSE
fips.provider.1=SunPKCS11 ${java.home}/conf/security/nss.fips.cfg
fips.provider.2=SUN
fips.provider.3=SunEC
fips.provider.4=SunJSSE
fips.keystore.type=PKCS11
keystore.type=pkcs12
jdk.tls.disabledAlgorithms=SSLv3, TLSv1, TLSv1.1, \\
    RC4, DES
fips.nssdb.pin=pin:
";

struct Fixture {
    _dir: tempfile::TempDir,
    java_config: PathBuf,
    policy: PathBuf,
}

fn fixture(policy: &str) -> Fixture {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let java_config = dir.path().join("java.config");
    let policy_path = dir.path().join("config");
    fs::write(&java_config, JAVA_CONFIG).expect("should write java.config");
    fs::write(&policy_path, policy).expect("should write policy");
    Fixture {
        _dir: dir,
        java_config,
        policy: policy_path,
    }
}

fn configure(
    java_config: &Path,
    policy: &Path,
    config: &mut SecurityConfig,
) -> Result<fipsalign::fips::Configured, FipsError> {
    FipsConfigurator::new(PolicyFileProbe::new(policy), java_config).configure(config)
}

fn providers(config: &SecurityConfig) -> Vec<(String, String)> {
    config
        .security
        .iter()
        .filter(|(k, _)| k.starts_with(SECURITY_PROVIDER_PREFIX))
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

#[test]
fn fips_policy_rewrites_providers_and_keystore() {
    let fx = fixture("FIPS\n");
    let mut config = SecurityConfig::default();

    let out = configure(&fx.java_config, &fx.policy, &mut config).expect("should configure");

    assert!(out.loaded);
    assert_eq!(out.state, FipsState::enforced(true));
    assert_eq!(
        providers(&config),
        vec![
            (
                "security.provider.1".to_owned(),
                "SunPKCS11 ${java.home}/conf/security/nss.fips.cfg".to_owned()
            ),
            ("security.provider.2".to_owned(), "SUN".to_owned()),
            ("security.provider.3".to_owned(), "SunEC".to_owned()),
            ("security.provider.4".to_owned(), "SunJSSE".to_owned()),
        ]
    );
    assert_eq!(config.security.get("keystore.type"), Some("PKCS11"));
    assert_eq!(config.system.get("javax.net.ssl.keyStore"), Some("NONE"));
    assert_eq!(
        config.system.get("javax.net.ssl.trustStoreType"),
        Some("pkcs12")
    );
    assert_eq!(
        config.security.get("jdk.tls.disabledAlgorithms"),
        Some("SSLv3, TLSv1, TLSv1.1, RC4, DES")
    );
}

#[test]
fn non_fips_policy_keeps_base_configuration() {
    let fx = fixture("DEFAULT\n");
    let mut config = SecurityConfig::default();

    let out = configure(&fx.java_config, &fx.policy, &mut config).expect("should configure");

    assert!(out.loaded);
    assert_eq!(out.state, FipsState::DISABLED);
    assert_eq!(config.security.get("security.provider.2"), Some("SunRsaSign"));
    assert_eq!(config.security.get("keystore.type"), Some("pkcs12"));
    assert!(config.system.is_empty());
}

#[test]
fn opt_out_ignores_fips_policy() {
    let fx = fixture("FIPS\n");
    let mut config = SecurityConfig::new(
        Properties::new(),
        Properties::from_iter([("com.redhat.fips", "False")]),
    );

    let out = configure(&fx.java_config, &fx.policy, &mut config).expect("should configure");

    assert_eq!(out.state, FipsState::DISABLED);
    assert_eq!(config.security.get("security.provider.1"), Some("SUN"));
}

#[test]
fn missing_base_file_is_soft_but_probe_still_applies() {
    let fx = fixture("FIPS\n");
    let missing = fx.java_config.with_file_name("absent.config");
    let mut config = SecurityConfig::new(
        Properties::from_iter([
            ("security.provider.1", "SUN"),
            ("fips.provider.1", "SunPKCS11"),
        ]),
        Properties::new(),
    );

    let out = configure(&missing, &fx.policy, &mut config).expect("should configure");

    assert!(out.loaded, "FIPS rewriting counts as a loaded configuration");
    assert!(out.state.enabled());
    assert_eq!(config.security.get("security.provider.1"), Some("SunPKCS11"));
}

#[test]
fn missing_base_file_without_fips_reports_not_loaded() {
    let fx = fixture("DEFAULT\n");
    let missing = fx.java_config.with_file_name("absent.config");
    let mut config = SecurityConfig::default();

    let out = configure(&missing, &fx.policy, &mut config).expect("should configure");

    assert!(!out.loaded);
    assert!(config.security.is_empty());
}

#[test]
fn unreadable_policy_is_fatal() {
    let fx = fixture("FIPS\n");
    let missing_policy = fx.policy.with_file_name("no-such-policy");
    let mut config = SecurityConfig::default();

    let result = configure(&fx.java_config, &missing_policy, &mut config);

    assert!(matches!(result, Err(FipsError::PolicyRead { .. })));
}

#[test]
fn plain_key_support_override_comes_from_system_properties() {
    let fx = fixture("FIPS\n");
    let mut config = SecurityConfig::new(
        Properties::new(),
        Properties::from_iter([("com.redhat.fips.plainKeySupport", "no")]),
    );

    let out = configure(&fx.java_config, &fx.policy, &mut config).expect("should configure");

    assert!(out.state.enabled());
    assert!(!out.state.plain_key_support_enabled());
}
