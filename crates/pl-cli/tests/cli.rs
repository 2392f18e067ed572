//! Binary-level tests for `privlog`.

use assert_cmd::Command;
use pl_audit::{BatchConfig, SigningIdentity, TemplateBuilder};
use pl_redact::{
    BlindingSanitizerFactory, ParamSanitizerRegistry, PrivacyRecord, RecipientSecret,
    SymmetricEncryptionFactory,
};
use predicates::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

fn privlog() -> Command {
    let mut cmd = Command::cargo_bin("privlog").unwrap();
    cmd.env_remove("PRIVLOG_TRUSTED_SIGNER")
        .env_remove("PRIVLOG_RECIPIENT_SECRET")
        .env_remove("RUST_LOG");
    cmd
}

struct Fixture {
    _dir: TempDir,
    templates: PathBuf,
    escrow: PathBuf,
    signer: String,
    recipient: RecipientSecret,
}

/// Two templates with blinded users and symmetrically encrypted cards. The
/// generated key is escrowed, sealed to `recipient`.
fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let templates = dir.path().join("audit.jsonl");
    let escrow = dir.path().join("escrow.sealed");
    let recipient = RecipientSecret::generate();
    let identity = SigningIdentity::generate();

    let mut registry = ParamSanitizerRegistry::new();
    registry
        .register("user", BlindingSanitizerFactory::new())
        .unwrap();
    registry
        .register(
            "card",
            SymmetricEncryptionFactory::new()
                .with_sequence_numbers(true)
                .with_rotate_iv(true)
                .with_escrow_recipient(recipient.public_key())
                .with_escrow_sink(File::create(&escrow).unwrap()),
        )
        .unwrap();
    let registry = Arc::new(registry);

    let builder = TemplateBuilder::configure(BatchConfig {
        batch_size: 2,
        pattern: "%msg".to_string(),
        ..BatchConfig::default()
    })
    .signer(identity.clone())
    .registry(registry.clone())
    .output(File::create(&templates).unwrap())
    .start()
    .unwrap();

    for (user, card) in [("alice", "4111-1111"), ("bob", "5500-0004"), ("carol", "3400-0009")] {
        let record = PrivacyRecord::build(
            &registry,
            "{user} paid with {card}",
            vec![user.into(), card.into()],
        );
        builder.consume(&record).unwrap();
    }
    builder.close().unwrap();

    Fixture {
        _dir: dir,
        templates,
        escrow,
        signer: identity.public_key_base64(),
        recipient,
    }
}

fn tamper(path: &Path) {
    let content = std::fs::read_to_string(path).unwrap();
    std::fs::write(path, content.replacen(" paid with ", " refunded ", 1)).unwrap();
}

// ============================================================================
// keygen
// ============================================================================

#[test]
fn test_keygen_recipient_json() {
    let output = privlog()
        .args(["--format", "json", "keygen", "recipient"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let secret = RecipientSecret::from_base64(value["secret"].as_str().unwrap()).unwrap();
    assert_eq!(
        secret.public_key().to_base64(),
        value["public"].as_str().unwrap()
    );
}

#[test]
fn test_keygen_signing_to_file_keeps_secret_off_stdout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("signing.key");

    let output = privlog()
        .args(["keygen", "signing", "--out"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let secret = std::fs::read_to_string(&path).unwrap();
    let identity = SigningIdentity::from_base64(&secret).unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains(&identity.public_key_base64()));
    assert!(!stdout.contains(secret.trim()));

    // Refuses to overwrite.
    privlog()
        .args(["keygen", "signing", "--out"])
        .arg(&path)
        .assert()
        .code(21);
}

// ============================================================================
// verify
// ============================================================================

#[test]
fn test_verify_accepts_trusted_stream() {
    let fx = fixture();
    privlog()
        .arg("verify")
        .arg(&fx.templates)
        .args(["--signer", &fx.signer])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 templates, 0 failed"));
}

#[test]
fn test_verify_rejects_tampered_stream() {
    let fx = fixture();
    tamper(&fx.templates);
    privlog()
        .arg("verify")
        .arg(&fx.templates)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("1 failed"));
}

#[test]
fn test_verify_rejects_untrusted_signer() {
    let fx = fixture();
    let other = SigningIdentity::generate().public_key_base64();
    privlog()
        .arg("verify")
        .arg(&fx.templates)
        .args(["--signer", &other])
        .assert()
        .code(1);
}

#[test]
fn test_verify_missing_file() {
    privlog()
        .args(["verify", "/nonexistent/audit.jsonl"])
        .assert()
        .code(21);
}

// ============================================================================
// render
// ============================================================================

#[test]
fn test_render_sanitized_by_default() {
    let fx = fixture();
    privlog()
        .arg("render")
        .arg(&fx.templates)
        .assert()
        .success()
        .stdout(predicate::str::contains("***** paid with {sym:0:"))
        .stdout(predicate::str::contains("alice").not())
        .stdout(predicate::str::contains("4111").not());
}

#[test]
fn test_render_disclose_shows_critical_view() {
    let fx = fixture();
    privlog()
        .arg("render")
        .arg(&fx.templates)
        .arg("--disclose")
        .assert()
        .success()
        .stdout(predicate::str::contains("alice paid with 4111-1111"))
        .stdout(predicate::str::contains("carol paid with 3400-0009"));
}

#[test]
fn test_render_decrypts_tokens_with_sealed_escrow() {
    let fx = fixture();
    privlog()
        .arg("render")
        .arg(&fx.templates)
        .args(["--secret", &fx.recipient.to_base64()])
        .arg("--escrow")
        .arg(&fx.escrow)
        .args(["--sealed-escrow", "--rotate-iv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("***** paid with 5500-0004"))
        .stdout(predicate::str::contains("alice").not());
}

#[test]
fn test_render_refuses_tampered_stream() {
    let fx = fixture();
    tamper(&fx.templates);
    privlog().arg("render").arg(&fx.templates).assert().code(1);
    privlog()
        .arg("render")
        .arg(&fx.templates)
        .arg("--no-verify")
        .assert()
        .success();
}

// ============================================================================
// open-escrow
// ============================================================================

#[test]
fn test_open_escrow_prints_document() {
    let fx = fixture();
    privlog()
        .arg("open-escrow")
        .arg(&fx.escrow)
        .args(["--secret", &fx.recipient.to_base64()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Secret Key: "))
        .stdout(predicate::str::contains("InitVector: "));
}

#[test]
fn test_open_escrow_wrong_secret() {
    let fx = fixture();
    let other = RecipientSecret::generate();
    privlog()
        .arg("open-escrow")
        .arg(&fx.escrow)
        .args(["--secret", &other.to_base64()])
        .assert()
        .code(11);
}
