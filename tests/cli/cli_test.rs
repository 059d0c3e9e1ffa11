//! Runs the compiled binary against temp crypto-policies files.

use std::fs;
use std::path::Path;

use assert_cmd::Command;

const JAVA_CONFIG: &str = "\
security.provider.1=SUN
security.provider.2=SunRsaSign
fips.provider.1=SunPKCS11 ${java.home}/conf/security/nss.fips.cfg
fips.provider.2=SUN
fips.keystore.type=PKCS11
keystore.type=pkcs12
fips.nssdb.pin=pin:0000
";

struct Env {
    dir: tempfile::TempDir,
}

impl Env {
    fn new(policy: &str) -> Self {
        let dir = tempfile::tempdir().expect("should create temp dir");
        fs::write(dir.path().join("java.config"), JAVA_CONFIG).expect("should write java.config");
        fs::write(dir.path().join("policy"), policy).expect("should write policy");
        Self { dir }
    }

    fn path(&self, name: &str) -> String {
        self.dir.path().join(name).display().to_string()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("fipsalign").expect("binary should build");
        cmd.env("FIPSALIGN_CONFIG_PATH", self.path("absent.toml"))
            .env("FIPSALIGN_JAVA_CONFIG", self.path("java.config"))
            .env("FIPSALIGN_PROBE", "policy-file")
            .env("FIPSALIGN_POLICY_CONFIG", self.path("policy"))
            .env_remove("FIPSALIGN_FIPS")
            .env_remove("FIPSALIGN_PLAIN_KEY_SUPPORT")
            .env("RUST_LOG", "warn");
        cmd
    }

    fn dir(&self) -> &Path {
        self.dir.path()
    }
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn help_lists_subcommands() {
    let env = Env::new("FIPS\n");
    let output = env.command().arg("--help").output().expect("should run");

    assert!(output.status.success());
    let text = stdout(&output);
    for sub in ["status", "configure", "pin", "import-check"] {
        assert!(text.contains(sub), "help should mention {sub}");
    }
}

#[test]
fn status_reports_fips_enabled() {
    let env = Env::new("FIPS\n");
    let output = env.command().arg("status").output().expect("should run");

    assert!(output.status.success());
    assert!(stdout(&output).contains("fips: enabled"));
}

#[test]
fn status_fails_without_policy_file() {
    let env = Env::new("FIPS\n");
    let output = env
        .command()
        .env("FIPSALIGN_POLICY_CONFIG", env.dir().join("missing").display().to_string())
        .arg("status")
        .output()
        .expect("should run");

    assert!(!output.status.success());
}

#[test]
fn configure_json_reports_rewritten_providers() {
    let env = Env::new("FIPS\n");
    let output = env
        .command()
        .args(["configure", "--json"])
        .output()
        .expect("should run");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(report["loaded"], true);
    assert_eq!(report["fips"]["enabled"], true);
    assert_eq!(
        report["security"]["security.provider.1"],
        "SunPKCS11 ${java.home}/conf/security/nss.fips.cfg"
    );
    assert_eq!(report["system"]["javax.net.ssl.keyStore"], "NONE");
    assert_eq!(report["system"]["javax.net.ssl.trustStoreType"], "pkcs12");
}

#[test]
fn configure_respects_opt_out() {
    let env = Env::new("FIPS\n");
    let output = env
        .command()
        .env("FIPSALIGN_FIPS", "false")
        .args(["configure", "--json"])
        .output()
        .expect("should run");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(report["fips"]["enabled"], false);
    assert_eq!(report["security"]["security.provider.2"], "SunRsaSign");
}

#[test]
fn pin_prints_length_only() {
    let env = Env::new("FIPS\n");
    let output = env
        .command()
        .args(["pin", "--property", "PIN:abcd"])
        .output()
        .expect("should run");

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("pin: 4 units"));
    assert!(!text.contains("abcd"));
}

#[test]
fn pin_defaults_to_configured_property() {
    let env = Env::new("FIPS\n");
    let output = env.command().arg("pin").output().expect("should run");

    assert!(output.status.success());
    assert!(stdout(&output).contains("pin: 4 units"));
}

#[test]
fn import_check_imports_in_fips_mode() {
    let env = Env::new("FIPS\n");
    let output = env.command().arg("import-check").output().expect("should run");

    assert!(output.status.success());
    assert!(stdout(&output).starts_with("imported: object#"));
}

#[test]
fn import_check_creates_outside_fips_mode() {
    let env = Env::new("DEFAULT\n");
    let output = env.command().arg("import-check").output().expect("should run");

    assert!(output.status.success());
    assert!(stdout(&output).starts_with("created: object#"));
}

#[test]
fn import_check_fails_when_plain_keys_are_disabled() {
    let env = Env::new("FIPS\n");
    let output = env
        .command()
        .env("FIPSALIGN_PLAIN_KEY_SUPPORT", "false")
        .arg("import-check")
        .output()
        .expect("should run");

    assert!(!output.status.success());
}
