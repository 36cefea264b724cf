// tests/config_loading.rs

use std::io::Write;

use procdag::config::load_and_validate;
use procdag::errors::ProcdagError;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let cfg = load_and_validate("does-not-exist/Procdag.toml").expect("defaults");
    assert_eq!(cfg.server.host, "127.0.0.1");
    assert_eq!(cfg.server.port, 8990);
    assert_eq!(cfg.runner.metrics_interval_secs, 5);
    assert_eq!(cfg.runner.kill_grace_secs, 5);
}

#[test]
fn empty_file_uses_every_default() {
    let file = write_config("");
    let cfg = load_and_validate(file.path()).expect("defaults");
    assert_eq!(cfg.server.port, 8990);
}

#[test]
fn sections_override_defaults() {
    let file = write_config(
        r#"
[server]
host = "0.0.0.0"
port = 9999

[runner]
metrics_interval_secs = 2
kill_grace_secs = 10
"#,
    );

    let cfg = load_and_validate(file.path()).expect("config");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9999);
    assert_eq!(cfg.runner.metrics_interval_secs, 2);
    assert_eq!(cfg.runner.kill_grace_secs, 10);
}

#[test]
fn zero_kill_grace_is_rejected() {
    let file = write_config(
        r#"
[runner]
kill_grace_secs = 0
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(ProcdagError::Config(_))
    ));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let file = write_config("[server\nhost = ???");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(ProcdagError::Toml(_))
    ));
}
