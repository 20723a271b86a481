//! Environment readiness check.

use crate::config::{Config, Env};
use crate::extractors;
use crate::session::browser::find_chromium;
use anyhow::Result;
use std::path::PathBuf;

/// Check Chromium availability, configuration files and the data directory.
pub fn run(env: Env, config_dir: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<i32> {
    println!("psync doctor");
    println!("============");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!("Env:  {env}");
    println!();

    // Browser-backed extractors need Chromium
    let chromium = find_chromium();
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install chromium or set PSYNC_CHROMIUM_PATH."
        ),
    }

    let config_dir = config_dir.unwrap_or_else(|| env.default_config_dir());
    let secrets_file = config_dir.join(".env");
    if secrets_file.exists() {
        println!("[OK] Secrets file present: {}", secrets_file.display());
    } else {
        println!("[!!] Secrets file missing: {}", secrets_file.display());
    }
    let env_file = config_dir.join(format!(".env.{env}"));
    if env_file.exists() {
        println!("[OK] Environment file present: {}", env_file.display());
    } else {
        println!("[??] Environment file missing: {}", env_file.display());
    }

    let data_dir = data_dir.unwrap_or_else(|| env.default_data_dir());
    if data_dir.is_dir() {
        println!("[OK] Data directory exists: {}", data_dir.display());
    } else {
        println!(
            "[??] Data directory will be created on first run: {}",
            data_dir.display()
        );
    }
    println!();

    // Which extractors have their required keys configured
    let config = Config::load(&config_dir, env);
    let registry = extractors::builtin();
    for capability in registry.iter() {
        let missing: Vec<&str> = capability
            .required_secrets()
            .iter()
            .filter(|key| {
                config
                    .get(key)
                    .map(|v| v.trim().is_empty())
                    .unwrap_or(true)
            })
            .copied()
            .collect();
        if missing.is_empty() {
            println!("[OK] {:<14} configured", capability.name());
        } else {
            println!(
                "[!!] {:<14} missing: {}",
                capability.name(),
                missing.join(", ")
            );
        }
    }
    println!();

    let ready = chromium.is_some() && secrets_file.exists();
    if ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(0)
}
