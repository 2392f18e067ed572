//! Batch rotation under write failures and concurrent producers.

use pl_audit::{
    AuditError, BatchConfig, BatchStats, SigningIdentity, TemplateBuilder, TemplateReader,
};
use pl_redact::{
    EncryptedToken, KeyEscrow, ParamSanitizerRegistry, PrivacyRecord, SymmetricEncryptionFactory,
};
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread;

// ============================================================================
// Helpers
// ============================================================================

const KEY: [u8; 32] = [3u8; 32];
const IV: [u8; 12] = [4u8; 12];

/// Shared sink that rejects the first `fail` writes.
#[derive(Clone, Default)]
struct FlakySink {
    data: Arc<Mutex<Vec<u8>>>,
    fail: Arc<Mutex<usize>>,
}

impl FlakySink {
    fn failing(fail: usize) -> Self {
        Self {
            data: Arc::default(),
            fail: Arc::new(Mutex::new(fail)),
        }
    }

    fn bytes(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl Write for FlakySink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut fail = self.fail.lock().unwrap();
        if *fail > 0 {
            *fail -= 1;
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "device gone"));
        }
        self.data.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn card_registry() -> Arc<ParamSanitizerRegistry> {
    let mut registry = ParamSanitizerRegistry::new();
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

fn plain(registry: &ParamSanitizerRegistry, text: &str) -> PrivacyRecord {
    PrivacyRecord::build(registry, text, Vec::new())
}

// ============================================================================
// Rotation on failure
// ============================================================================

#[test]
fn test_failed_write_still_rotates_template() {
    let registry = Arc::new(ParamSanitizerRegistry::new());
    let out = FlakySink::failing(1);
    let builder = TemplateBuilder::configure(BatchConfig {
        batch_size: 2,
        pattern: "%msg".to_string(),
        ..BatchConfig::default()
    })
    .signer(SigningIdentity::generate())
    .registry(registry.clone())
    .output(out.clone())
    .start()
    .unwrap();

    builder.consume(&plain(&registry, "a")).unwrap();
    let err = builder.consume(&plain(&registry, "b")).unwrap_err();
    assert!(matches!(err, AuditError::Io(_)));
    assert_eq!(
        builder.stats(),
        BatchStats {
            records: 2,
            signed: 0,
            failed: 1,
        }
    );

    // The lost batch is not carried into the next template.
    builder.consume(&plain(&registry, "c")).unwrap();
    builder.consume(&plain(&registry, "d")).unwrap();
    builder.close().unwrap();
    assert_eq!(builder.stats().signed, 1);
    assert_eq!(builder.stats().failed, 1);

    let templates = TemplateReader::from_bytes(out.bytes())
        .read_verified(None)
        .unwrap();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].id(), 1);
    assert_eq!(templates[0].render_critical(), "c\nd\n");
}

// ============================================================================
// Concurrent producers
// ============================================================================

#[test]
fn test_concurrent_producers_fill_whole_batches() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;
    const BATCH: usize = 5;

    let registry = card_registry();
    let out = FlakySink::default();
    let builder = TemplateBuilder::configure(BatchConfig {
        batch_size: BATCH,
        pattern: "%msg".to_string(),
        ..BatchConfig::default()
    })
    .signer(SigningIdentity::generate())
    .registry(registry.clone())
    .output(out.clone())
    .start()
    .unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let builder = Arc::clone(&builder);
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let record = PrivacyRecord::build(
                        &registry,
                        "{card}",
                        vec![format!("t{}-r{}", t, i)],
                    );
                    builder.consume(&record).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = THREADS * PER_THREAD;
    let stats = builder.stats();
    assert_eq!(stats.records, total as u64);
    assert_eq!(stats.signed, (total / BATCH) as u64);
    assert_eq!(stats.failed, 0);
    builder.close().unwrap();
    assert_eq!(builder.stats().signed, (total / BATCH) as u64);

    let templates = TemplateReader::from_bytes(out.bytes())
        .read_verified(None)
        .unwrap();
    assert_eq!(templates.len(), total / BATCH);

    let escrow = KeyEscrow {
        starting_date: String::new(),
        secret_key: Some(KEY.to_vec().into()),
        init_vector: Some(IV.to_vec()),
    };
    let mut values = BTreeSet::new();
    let mut sequences = BTreeSet::new();
    for (n, template) in templates.iter().enumerate() {
        assert_eq!(template.id(), n as u64);

        let critical = template.render_critical();
        let lines: Vec<&str> = critical.lines().collect();
        assert_eq!(lines.len(), BATCH);

        // IV and sequence number advance together under contention.
        let sanitized = template.render_sanitized();
        let tokens = EncryptedToken::find_all(&sanitized);
        assert_eq!(tokens.len(), BATCH);
        for (line, (_, token)) in lines.iter().zip(tokens) {
            assert_eq!(escrow.decrypt(&token, true).unwrap(), line.as_bytes());
            assert!(sequences.insert(token.sequence.unwrap()));
        }
        values.extend(lines.iter().map(|l| l.to_string()));
    }
    assert_eq!(values.len(), total);
    assert_eq!(sequences, (0..total as u64).collect::<BTreeSet<_>>());
}
