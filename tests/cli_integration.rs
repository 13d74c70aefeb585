mod common;

use assert_cmd::Command;
use common::TestEnvironment;
use predicates::prelude::*;
use sfsearch::login::verify_password;

fn sfsearch() -> Command {
    Command::cargo_bin("sfsearch").unwrap()
}

#[test]
fn search_prints_ndjson_records() {
    let env = TestEnvironment::new();
    env.needle_fixture();

    sfsearch()
        .arg("search")
        .arg("needle")
        .arg("--root")
        .arg(env.root())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name":"a.txt""#))
        .stdout(predicate::str::contains("c.txt").not())
        .stdout(predicate::str::contains(
            r#"{"type":"status","message":"Search completed"}"#,
        ));
}

#[test]
fn short_query_fails_with_error_record() {
    let env = TestEnvironment::new();

    sfsearch()
        .args(["search", "x", "--root"])
        .arg(env.root())
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            r#"{"type":"error","message":"Search term too short"}"#,
        ));
}

#[test]
fn missing_root_is_a_config_error() {
    let env = TestEnvironment::new();

    sfsearch()
        .args(["search", "needle", "--root"])
        .arg(env.outside().join("nope"))
        .assert()
        .failure();
}

#[test]
fn hash_password_prints_verifiable_bcrypt_hash() {
    let output = sfsearch()
        .args(["hash-password", "1234", "--cost", "4"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("$2y$04$"))
        .get_output()
        .stdout
        .clone();
    let hash = String::from_utf8(output).unwrap();
    assert_eq!(hash.trim().len(), 60);
    assert!(verify_password("1234", hash.trim()));
}

#[test]
fn hash_password_rejects_invalid_cost() {
    sfsearch()
        .args(["hash-password", "1234", "--cost", "40"])
        .assert()
        .failure();
}

#[test]
fn reads_config_file() {
    let env = TestEnvironment::new();
    env.create_file("notes.txt", "needle");
    env.create_file("notes.md", "needle");
    let config = env.outside().join("sfsearch.toml");
    std::fs::write(
        &config,
        format!(
            "[search]\nroot_dir = {:?}\nallowed_extensions = [\"md\"]\n",
            env.root().display().to_string()
        ),
    )
    .unwrap();

    sfsearch()
        .arg("--config")
        .arg(&config)
        .args(["search", "needle"])
        .assert()
        .success()
        .stdout(predicate::str::contains("notes.md"))
        .stdout(predicate::str::contains("notes.txt").not());
}
