//! Configuration file resolution tests
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate BIDS_CONVERT_CONFIG are marked with #[serial].

use bids_common::config::{
    load_toml, ConfigFileResolver, LoggingConfig, CONFIG_ENV_VAR, CONFIG_FILE_NAME,
};
use bids_common::Error;
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
#[serial]
fn test_resolver_env_var_beats_working_dir() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "").unwrap();
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolver = ConfigFileResolver::new().with_working_dir(temp_dir.path());
    let path = resolver.resolve(None).unwrap();

    env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(path, PathBuf::from("/tmp/from-env.toml"));
}

#[test]
#[serial]
fn test_resolver_cli_beats_env_var() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolver = ConfigFileResolver::new();
    let path = resolver.resolve(Some(Path::new("cli.toml"))).unwrap();

    env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(path, PathBuf::from("cli.toml"));
}

#[test]
#[serial]
fn test_resolver_finds_file_in_working_dir() {
    env::remove_var(CONFIG_ENV_VAR);
    let temp_dir = TempDir::new().unwrap();
    let local = temp_dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&local, "").unwrap();

    let resolver = ConfigFileResolver::new().with_working_dir(temp_dir.path());
    assert_eq!(resolver.resolve(None).unwrap(), local);
}

#[test]
#[serial]
fn test_resolver_empty_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "   ");
    let temp_dir = TempDir::new().unwrap();
    let local = temp_dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&local, "").unwrap();

    let resolver = ConfigFileResolver::new().with_working_dir(temp_dir.path());
    let path = resolver.resolve(None).unwrap();

    env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(path, local);
}

#[derive(Debug, Deserialize)]
struct Wrapper {
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
fn test_load_toml_logging_section() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("c.toml");
    std::fs::write(&path, "[logging]\nlevel = \"debug\"\nfile = \"/tmp/run.log\"\n").unwrap();

    let parsed: Wrapper = load_toml(&path).unwrap();
    assert_eq!(parsed.logging.level, "debug");
    assert_eq!(parsed.logging.file, Some(PathBuf::from("/tmp/run.log")));
}

#[test]
fn test_load_toml_missing_section_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("empty.toml");
    std::fs::write(&path, "").unwrap();

    let parsed: Wrapper = load_toml(&path).unwrap();
    assert_eq!(parsed.logging, LoggingConfig::default());
}

#[test]
fn test_load_toml_parse_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    std::fs::write(&path, "[logging\nlevel = ").unwrap();

    let result: Result<Wrapper, Error> = load_toml(&path);
    assert!(matches!(result, Err(Error::Toml(_))));
}
