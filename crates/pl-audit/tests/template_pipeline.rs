//! End-to-end tests for the audit pipeline:
//! - host events dispatched through the privacy filter
//! - batch templates signed, written and verified from disk
//! - exchangeable values disclosed in either view
//! - encrypted parameters recoverable from the sanitized view
//! - plain line sink never carries critical values

use pl_audit::{
    AuditError, BatchConfig, DigestChain, Entry, LineSink, Pattern, SigningIdentity,
    TemplateBuilder, TemplateReader,
};
use pl_redact::{
    BlindingSanitizerFactory, DigestAlgorithm, EncryptedToken, KeyEscrow, LogEvent,
    ParamSanitizerRegistry, PrivacyFilter, PrivacyRecord, RecipientSecret,
    SymmetricEncryptionFactory,
};
use std::fs::File;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::Level;

// ============================================================================
// Helpers
// ============================================================================

const KEY: [u8; 32] = [7u8; 32];
const IV: [u8; 12] = [9u8; 12];

fn registry() -> Arc<ParamSanitizerRegistry> {
    let mut registry = ParamSanitizerRegistry::new();
    registry
        .register("user", BlindingSanitizerFactory::new())
        .unwrap();
    registry
        .register(
            "card",
            SymmetricEncryptionFactory::new()
                .with_key(&KEY)
                .with_iv(&IV)
                .with_sequence_numbers(true)
                .with_rotate_iv(true),
        )
        .unwrap();
    Arc::new(registry)
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

fn message_config(batch_size: usize) -> BatchConfig {
    BatchConfig {
        batch_size,
        pattern: "%level %msg".to_string(),
        ..BatchConfig::default()
    }
}

// ============================================================================
// Filter → builder → file
// ============================================================================

#[test]
fn test_filter_feeds_builder_and_templates_verify_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit.jsonl");
    let registry = registry();
    let identity = SigningIdentity::generate();

    let builder = TemplateBuilder::configure(message_config(2))
        .signer(identity.clone())
        .registry(registry.clone())
        .output(File::create(&path).unwrap())
        .start()
        .unwrap();

    let filter = PrivacyFilter::new(registry.clone()).with_sink(builder.clone());
    filter.start();

    for user in ["alice", "bob", "carol"] {
        let event =
            LogEvent::new(Level::INFO, "auth", "login by {user}").with_params([user]);
        assert!(filter.decide(event));
    }
    // Below the threshold: handled but never reaches the builder.
    assert!(filter.decide(LogEvent::new(Level::DEBUG, "auth", "noise")));
    builder.close().unwrap();

    let templates = TemplateReader::open(&path)
        .unwrap()
        .read_verified(Some(&identity.public_key_base64()))
        .unwrap();
    assert_eq!(templates.len(), 2);
    assert_eq!(
        templates[0].render_sanitized(),
        "INFO login by *****\nINFO login by *****\n"
    );
    assert_eq!(
        templates[0].render_critical(),
        "INFO login by alice\nINFO login by bob\n"
    );
    assert_eq!(templates[1].name(), "Logging Template 1");
    assert_eq!(templates[1].render_critical(), "INFO login by carol\n");

    let stats = filter.stats();
    assert_eq!(stats.dispatched, 3);
    assert_eq!(stats.suppressed, 1);
    assert_eq!(builder.stats().signed, 2);
}

#[test]
fn test_level_is_blank_and_message_parts_are_fixed() {
    let out = SharedBuf::default();
    let registry = registry();
    let builder = TemplateBuilder::configure(message_config(1))
        .signer(SigningIdentity::generate())
        .registry(registry.clone())
        .output(out.clone())
        .start()
        .unwrap();

    let event = LogEvent::new(Level::WARN, "auth", "user {user} from {}")
        .with_params(["alice", "10.0.0.1"]);
    builder
        .consume(&PrivacyRecord::from_event(&registry, event))
        .unwrap();

    let templates = TemplateReader::from_bytes(out.text().into_bytes())
        .read_all()
        .unwrap();
    assert_eq!(
        templates[0].entries(),
        &[
            Entry::blank("WARN"),
            Entry::fixed(" user "),
            Entry::exchangeable("alice", "*****"),
            Entry::fixed(" from 10.0.0.1"),
        ]
    );
}

// ============================================================================
// Disclosure
// ============================================================================

#[test]
fn test_encrypted_value_recoverable_from_sanitized_view() {
    let out = SharedBuf::default();
    let registry = registry();
    let builder = TemplateBuilder::configure(message_config(1))
        .signer(SigningIdentity::generate())
        .registry(registry.clone())
        .output(out.clone())
        .start()
        .unwrap();

    for card in ["4111-1111-1111-1111", "5500-0000-0000-0004"] {
        let record = PrivacyRecord::build(&registry, "charged {card}", vec![card.into()]);
        builder.consume(&record).unwrap();
    }

    let templates = TemplateReader::from_bytes(out.text().into_bytes())
        .read_verified(None)
        .unwrap();
    let escrow = KeyEscrow {
        starting_date: String::new(),
        secret_key: Some(KEY.to_vec().into()),
        init_vector: Some(IV.to_vec()),
    };

    let sanitized = templates[1].render_sanitized();
    assert!(!sanitized.contains("5500"));
    let (_, token) = EncryptedToken::find_all(&sanitized).remove(0);
    assert_eq!(token.sequence, Some(1));
    assert_eq!(escrow.decrypt(&token, true).unwrap(), b"5500-0000-0000-0004");
    assert_eq!(templates[1].render_critical(), "INFO charged 5500-0000-0000-0004");
}

#[test]
fn test_recipients_recorded_in_signature_block() {
    let out = SharedBuf::default();
    let auditor = RecipientSecret::generate();
    let registry = registry();
    let builder = TemplateBuilder::configure(message_config(1))
        .signer(SigningIdentity::generate())
        .recipient(auditor.public_key())
        .output(out.clone())
        .start()
        .unwrap();

    let record = PrivacyRecord::build(&registry, "ping", Vec::new());
    builder.consume(&record).unwrap();

    let templates = TemplateReader::from_bytes(out.text().into_bytes())
        .read_all()
        .unwrap();
    assert_eq!(
        templates[0].signature.recipients,
        vec![auditor.public_key().to_base64()]
    );
}

#[test]
fn test_tampered_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit.jsonl");
    let registry = registry();
    let builder = TemplateBuilder::configure(message_config(1))
        .signer(SigningIdentity::generate())
        .registry(registry.clone())
        .output(File::create(&path).unwrap())
        .start()
        .unwrap();
    let record = PrivacyRecord::build(&registry, "balance {} EUR", vec!["100".into()]);
    builder.consume(&record).unwrap();
    builder.close().unwrap();

    let mut content = String::new();
    File::open(&path)
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    std::fs::write(&path, content.replace("balance 100", "balance 900")).unwrap();

    let err = TemplateReader::open(&path)
        .unwrap()
        .read_verified(None)
        .unwrap_err();
    assert!(matches!(err, AuditError::InvalidSignature { .. }));
}

// ============================================================================
// Line sink
// ============================================================================

#[test]
fn test_line_sink_never_writes_critical_values() {
    let registry = registry();
    let lines = Arc::new(
        LineSink::new(Pattern::parse("%level %logger - %msg").unwrap(), SharedBuf::default())
            .with_digest(DigestChain::new(DigestAlgorithm::Sha256)),
    );
    let filter = PrivacyFilter::new(registry).with_sink(lines.clone());
    filter.start();

    let event = LogEvent::new(Level::ERROR, "billing", "card {card} of {user} declined")
        .with_params(["4111-1111-1111-1111", "alice"]);
    assert!(filter.decide(event));
    drop(filter);

    let sink = Arc::try_unwrap(lines).ok().unwrap();
    let text = sink.into_inner().text();
    assert!(text.starts_with("ERROR billing - card {sym:0:"));
    assert!(text.contains(" of ***** declined [digest:"));
    assert!(!text.contains("4111"));
    assert!(!text.contains("alice"));
}
