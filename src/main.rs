//! fipsalign CLI entry point.
//!
//! Provides `status`, `configure`, `pin` and `import-check` subcommands for
//! probing the system FIPS posture, printing the aligned security
//! configuration, resolving the token PIN, and exercising key import.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use tracing::{debug, info};
use zeroize::Zeroizing;

use fipsalign::config::Settings;
use fipsalign::fips::{FipsConfigurator, FipsProbe, FipsState, SecurityConfig};
use fipsalign::pin::PinSource;
use fipsalign::properties::Properties;
use fipsalign::provider::PlainKeyImport;
use fipsalign::token::{AttributeSet, AttributeType, KeyClass, KeyType, SoftToken, Token};

/// Align security configuration with the system FIPS posture.
#[derive(Parser)]
#[command(name = "fipsalign", version, about)]
struct Cli {
    /// Also write JSON logs to this directory (daily rotation).
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Probe the system and print whether it runs in FIPS mode.
    Status,
    /// Align the security configuration and print the effective properties.
    Configure {
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Resolve the token PIN and print its length (never the PIN itself).
    Pin {
        /// PIN property value (`ENV:`, `FILE:` or `PIN:`) to resolve instead
        /// of the configured `fips.nssdb.pin`.
        #[arg(long)]
        property: Option<String>,
    },
    /// Create a random secret key on an in-memory token under the aligned
    /// posture and report how it was created.
    ImportCheck,
}

/// JSON output of `configure`.
#[derive(Serialize)]
struct ConfigureReport<'a> {
    loaded: bool,
    fips: FipsState,
    security: &'a Properties,
    system: &'a Properties,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _logging_guard = match &cli.log_dir {
        Some(dir) => Some(fipsalign::logging::init_production(dir)?),
        None => {
            fipsalign::logging::init_cli();
            None
        }
    };

    let settings = Settings::load().context("failed to load configuration")?;
    debug!(?settings, "configuration loaded");

    match cli.command {
        Command::Status => handle_status(&settings),
        Command::Configure { json } => handle_configure(&settings, json),
        Command::Pin { property } => handle_pin(&settings, property.as_deref()),
        Command::ImportCheck => handle_import_check(&settings),
    }
}

/// Probe the system once and print the posture.
fn handle_status(settings: &Settings) -> anyhow::Result<()> {
    let enabled = settings
        .fips_probe()
        .probe()
        .context("unable to determine the system FIPS posture")?;

    println!("probe: {:?}", settings.probe.source);
    println!("strategy: {}", fipsalign_probe::Strategy::COMPILED);
    println!("fips: {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

/// Run the configurator, returning the aligned configuration and posture.
fn align(settings: &Settings) -> anyhow::Result<(SecurityConfig, bool, FipsState)> {
    let mut config = settings.security_config();
    let configured = FipsConfigurator::new(settings.fips_probe(), &settings.paths.java_config)
        .configure(&mut config)
        .context("FIPS alignment failed")?;
    info!(
        loaded = configured.loaded,
        fips = configured.state.enabled(),
        plain_key_support = configured.state.plain_key_support_enabled(),
        "security configuration aligned"
    );
    Ok((config, configured.loaded, configured.state))
}

fn handle_configure(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let (config, loaded, state) = align(settings)?;

    if json {
        let report = ConfigureReport {
            loaded,
            fips: state,
            security: &config.security,
            system: &config.system,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize report")?
        );
        return Ok(());
    }

    println!("loaded: {loaded}");
    println!("fips: {}", state.enabled());
    println!("plain_key_support: {}", state.plain_key_support_enabled());
    println!();
    println!("[security]");
    for (key, value) in config.security.iter() {
        println!("{key}={value}");
    }
    println!();
    println!("[system]");
    for (key, value) in config.system.iter() {
        println!("{key}={value}");
    }
    Ok(())
}

fn handle_pin(settings: &Settings, property: Option<&str>) -> anyhow::Result<()> {
    let source = PinSource::from_env();
    let pin = match property {
        Some(value) => source.resolve(Some(value)),
        None => {
            let mut config = settings.security_config();
            if let Err(e) = config.security.load(&settings.paths.java_config) {
                debug!(error = %e, "base security properties not loaded");
            }
            source.resolve_from(&config)
        }
    }
    .context("failed to resolve the token PIN")?;

    println!("pin: {} units", pin.len());
    Ok(())
}

fn handle_import_check(settings: &Settings) -> anyhow::Result<()> {
    let (_, _, state) = align(settings)?;

    let token = Arc::new(SoftToken::new(settings.token_config()));
    let gate = PlainKeyImport::new(state, Arc::clone(&token));
    let session = token
        .open_object_session()
        .context("failed to open a token session")?;

    let mut value = Zeroizing::new(vec![0_u8; 32]);
    OsRng.fill_bytes(&mut value);
    let attrs = AttributeSet::new()
        .with(AttributeType::Class, KeyClass::SecretKey)
        .with(AttributeType::KeyType, KeyType::GenericSecret)
        .with(AttributeType::Value, value.to_vec());

    let created = gate.create_key(session, &attrs);
    token.release_session(session);
    let handle = created.context("key creation failed")?;

    let route = if token.unwrap_calls() > 0 {
        "imported"
    } else {
        "created"
    };
    println!("{route}: {handle}");
    Ok(())
}
