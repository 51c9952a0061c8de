use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::{TempDir, tempdir};

fn bin(root: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("iamages-lock"));
    cmd.env_remove("IAMAGES_LOCK_PASSWORD")
        .env_remove("IAMAGES_LOCK_NEW_PASSWORD")
        .arg("--root")
        .arg(root);
    cmd
}

/// A root with one plain image `cat` imported.
fn setup() -> TempDir {
    let dir = tempdir().unwrap();
    let image = dir.path().join("cat.png");
    std::fs::write(&image, b"\x89PNG not really").unwrap();

    bin(&dir.path().join("images"))
        .arg("import")
        .arg("cat")
        .arg(&image)
        .args(["--description", "a secret cat", "--width", "640", "--height", "480"])
        .args(["--content-type", "image/png"])
        .assert()
        .success()
        .stdout(predicate::str::contains("imported image 'cat'"));

    dir
}

fn root(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("images")
}

fn lock(dir: &TempDir, password: &str) {
    bin(&root(dir))
        .env("IAMAGES_LOCK_NEW_PASSWORD", password)
        .arg("lock")
        .arg("cat")
        .assert()
        .success()
        .stdout(predicate::str::contains("image 'cat' locked"));
}

#[test]
fn plain_metadata_needs_no_password() {
    let dir = setup();

    bin(&root(&dir))
        .arg("metadata")
        .arg("cat")
        .assert()
        .success()
        .stdout(predicate::str::contains("a secret cat"));
}

#[test]
fn lock_then_read_with_password() {
    let dir = setup();
    lock(&dir, "correct horse");

    bin(&root(&dir))
        .arg("info")
        .arg("cat")
        .assert()
        .success()
        .stdout(predicate::str::contains("locked:     true"))
        .stdout(predicate::str::contains("version:    v1"));

    bin(&root(&dir))
        .env("IAMAGES_LOCK_PASSWORD", "correct horse")
        .arg("metadata")
        .arg("cat")
        .assert()
        .success()
        .stdout(predicate::str::contains("image/png"));

    let out = dir.path().join("out.png");
    bin(&root(&dir))
        .env("IAMAGES_LOCK_PASSWORD", "correct horse")
        .arg("image")
        .arg("cat")
        .arg("--out")
        .arg(&out)
        .assert()
        .success();
    assert_eq!(std::fs::read(out).unwrap(), b"\x89PNG not really");
}

#[test]
fn locked_body_is_not_plaintext_on_disk() {
    let dir = setup();
    lock(&dir, "pw");

    let body = std::fs::read(root(&dir).join("cat").join("metadata.bin")).unwrap();
    assert!(!String::from_utf8_lossy(&body).contains("a secret cat"));
}

#[test]
fn wrong_password_fails() {
    let dir = setup();
    lock(&dir, "correct horse");

    bin(&root(&dir))
        .env("IAMAGES_LOCK_PASSWORD", "wrong")
        .arg("metadata")
        .arg("cat")
        .assert()
        .failure()
        .stderr(predicate::str::contains("incorrect key or corrupted data"));
}

#[test]
fn locked_image_without_password_fails() {
    let dir = setup();
    lock(&dir, "pw");

    bin(&root(&dir))
        .arg("metadata")
        .arg("cat")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No password provided"));
}

#[test]
fn mismatched_new_passwords_fail() {
    let dir = setup();

    bin(&root(&dir))
        .arg("lock")
        .arg("cat")
        .write_stdin("one\ntwo\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("passwords do not match"));
}

#[test]
fn piped_new_password_locks() {
    let dir = setup();

    bin(&root(&dir))
        .arg("lock")
        .arg("cat")
        .write_stdin("pw\npw\n")
        .assert()
        .success();

    bin(&root(&dir))
        .arg("metadata")
        .arg("cat")
        .write_stdin("pw\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("a secret cat"));
}

#[test]
fn passwd_changes_the_password() {
    let dir = setup();
    lock(&dir, "old");

    bin(&root(&dir))
        .env("IAMAGES_LOCK_PASSWORD", "old")
        .env("IAMAGES_LOCK_NEW_PASSWORD", "new")
        .arg("passwd")
        .arg("cat")
        .assert()
        .success();

    bin(&root(&dir))
        .env("IAMAGES_LOCK_PASSWORD", "old")
        .arg("metadata")
        .arg("cat")
        .assert()
        .failure();

    bin(&root(&dir))
        .env("IAMAGES_LOCK_PASSWORD", "new")
        .arg("metadata")
        .arg("cat")
        .assert()
        .success();
}

#[test]
fn unlock_requires_the_password() {
    let dir = setup();
    lock(&dir, "pw");

    bin(&root(&dir))
        .env("IAMAGES_LOCK_PASSWORD", "bad")
        .arg("unlock")
        .arg("cat")
        .assert()
        .failure();

    bin(&root(&dir))
        .env("IAMAGES_LOCK_PASSWORD", "pw")
        .arg("unlock")
        .arg("cat")
        .assert()
        .success()
        .stdout(predicate::str::contains("image 'cat' unlocked"));

    bin(&root(&dir))
        .arg("info")
        .arg("cat")
        .assert()
        .success()
        .stdout(predicate::str::contains("locked:     false"));
}

#[test]
fn describe_locked_image() {
    let dir = setup();
    lock(&dir, "pw");

    bin(&root(&dir))
        .env("IAMAGES_LOCK_PASSWORD", "pw")
        .arg("describe")
        .arg("cat")
        .arg("a renamed cat")
        .assert()
        .success();

    bin(&root(&dir))
        .env("IAMAGES_LOCK_PASSWORD", "pw")
        .arg("metadata")
        .arg("cat")
        .assert()
        .success()
        .stdout(predicate::str::contains("a renamed cat"));
}

#[test]
fn locking_twice_is_rejected_without_a_prompt() {
    let dir = setup();
    lock(&dir, "pw");

    bin(&root(&dir))
        .env("IAMAGES_LOCK_NEW_PASSWORD", "other")
        .arg("lock")
        .arg("cat")
        .assert()
        .failure()
        .stderr(predicate::str::contains("image is already locked"));

    bin(&root(&dir))
        .env("IAMAGES_LOCK_PASSWORD", "pw")
        .arg("metadata")
        .arg("cat")
        .assert()
        .success()
        .stdout(predicate::str::contains("a secret cat"));
}

#[test]
fn upgrade_is_a_no_op_at_latest_version() {
    let dir = setup();
    lock(&dir, "pw");

    bin(&root(&dir))
        .arg("upgrade")
        .arg("cat")
        .assert()
        .success()
        .stdout(predicate::str::contains("does not need an upgrade"));
}

#[test]
fn privacy_is_recorded() {
    let dir = setup();

    bin(&root(&dir))
        .arg("privacy")
        .arg("cat")
        .arg("true")
        .assert()
        .success();

    bin(&root(&dir))
        .arg("info")
        .arg("cat")
        .assert()
        .success()
        .stdout(predicate::str::contains("private:    true"));
}

#[test]
fn unknown_image_fails() {
    let dir = tempdir().unwrap();

    bin(&root(&dir))
        .arg("info")
        .arg("dog")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}
