//! Batch template builder.
//!
//! The builder turns privacy records into template entries and signs one
//! template per `batch_size` records. Each signed template is written to the
//! configured output as soon as it closes. A partial batch is signed on
//! [`TemplateBuilder::close`], which also runs at process exit.

use crate::pattern::{Pattern, DEFAULT_PATTERN};
use crate::shutdown::{self, HookId, ShutdownHook};
use crate::signer::SigningIdentity;
use crate::template::{Entry, Template, TEMPLATE_NAME_PREFIX};
use crate::writer::TemplateWriter;
use crate::{AuditError, Result};
use pl_redact::{ParamSanitizerRegistry, PrivacyRecord, RecipientKey, RecordSink};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error, info};

/// Default number of records per template.
pub const DEFAULT_BATCH_SIZE: usize = 15;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

fn default_name_prefix() -> String {
    TEMPLATE_NAME_PREFIX.to_string()
}

/// Builder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Records per template.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Conversion pattern applied to every record.
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Template names are `"<name_prefix> <id>"`.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Id of the first template.
    #[serde(default)]
    pub first_id: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            pattern: default_pattern(),
            name_prefix: default_name_prefix(),
            first_id: 0,
        }
    }
}

/// Counters reported by [`TemplateBuilder::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Records appended to a template.
    pub records: u64,
    /// Templates signed and written.
    pub signed: u64,
    /// Templates lost to a signing or write failure.
    pub failed: u64,
}

/// Collects the collaborators of a builder before it starts.
pub struct BuilderSetup {
    config: BatchConfig,
    signer: Option<SigningIdentity>,
    registry: Option<Arc<ParamSanitizerRegistry>>,
    recipients: Vec<RecipientKey>,
    output: Option<Box<dyn Write + Send>>,
}

impl BuilderSetup {
    pub fn signer(mut self, signer: SigningIdentity) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Registry consulted for converter sanitizers. Defaults to an empty one.
    pub fn registry(mut self, registry: Arc<ParamSanitizerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Name a party allowed to disclose exchangeable values.
    pub fn recipient(mut self, recipient: RecipientKey) -> Self {
        self.recipients.push(recipient);
        self
    }

    /// Where signed templates go.
    pub fn output(mut self, output: impl Write + Send + 'static) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    /// Validate the setup and start the builder.
    ///
    /// The builder registers itself for a final flush at process exit.
    pub fn start(self) -> Result<Arc<TemplateBuilder>> {
        let BuilderSetup {
            config,
            signer,
            registry,
            recipients,
            output,
        } = self;

        if config.batch_size == 0 {
            return Err(AuditError::NotConfigured(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        let signer =
            signer.ok_or_else(|| AuditError::NotConfigured("no signing identity".to_string()))?;
        let output = output.ok_or_else(|| AuditError::NotConfigured("no output".to_string()))?;
        let pattern = Pattern::parse(&config.pattern)?;

        let builder = Arc::new(TemplateBuilder {
            state: Mutex::new(BatchState {
                template: Template::new(config.first_id, &config.name_prefix),
                next_id: config.first_id + 1,
                invocations: 0,
                closed: false,
                out: TemplateWriter::new(output),
                stats: BatchStats::default(),
            }),
            hook: Mutex::new(None),
            registry: registry.unwrap_or_default(),
            pattern,
            signer,
            recipients,
            config,
        });

        let weak: Weak<TemplateBuilder> = Arc::downgrade(&builder);
        let hook = shutdown::register(weak);
        *lock(&builder.hook) = Some(hook);

        info!(
            batch_size = builder.config.batch_size,
            signer = %builder.signer.public_key_base64(),
            recipients = builder.recipients.len(),
            "Template builder started"
        );
        Ok(builder)
    }
}

struct BatchState {
    template: Template,
    next_id: u64,
    invocations: usize,
    closed: bool,
    out: TemplateWriter<Box<dyn Write + Send>>,
    stats: BatchStats,
}

/// Signs batches of records as audit templates.
pub struct TemplateBuilder {
    config: BatchConfig,
    pattern: Pattern,
    signer: SigningIdentity,
    recipients: Vec<RecipientKey>,
    registry: Arc<ParamSanitizerRegistry>,
    state: Mutex<BatchState>,
    hook: Mutex<Option<HookId>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TemplateBuilder {
    pub fn configure(config: BatchConfig) -> BuilderSetup {
        BuilderSetup {
            config,
            signer: None,
            registry: None,
            recipients: Vec::new(),
            output: None,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Append one record to the current template.
    ///
    /// Entry extraction happens before the batch lock is taken, so a failing
    /// sanitizer only loses this record. When the batch fills up the template
    /// is rotated first and then signed; a signing error is returned but the
    /// next batch has already begun.
    pub fn consume(&self, record: &PrivacyRecord) -> Result<()> {
        let entries = self.pattern.entries(record, &self.registry)?;

        let mut state = lock(&self.state);
        if state.closed {
            return Err(AuditError::not_started("template builder"));
        }

        state.template.extend(entries);
        if self.config.batch_size > 1 {
            state.template.push(Entry::fixed("\n"));
        }
        state.invocations += 1;
        state.stats.records += 1;

        if state.invocations >= self.config.batch_size {
            let next = Template::new(state.next_id, &self.config.name_prefix);
            state.next_id += 1;
            state.invocations = 0;
            let full = std::mem::replace(&mut state.template, next);
            self.sign_and_write(&mut state, full)?;
        }
        Ok(())
    }

    /// Sign any partial batch and stop accepting records.
    ///
    /// Only the first call has an effect.
    pub fn close(&self) -> Result<()> {
        let outcome = {
            let mut state = lock(&self.state);
            if state.closed {
                return Ok(());
            }
            state.closed = true;

            if state.invocations > 0 {
                state.invocations = 0;
                let next = Template::new(state.next_id, &self.config.name_prefix);
                let partial = std::mem::replace(&mut state.template, next);
                self.sign_and_write(&mut state, partial)
            } else {
                Ok(())
            }
        };

        if let Some(hook) = lock(&self.hook).take() {
            shutdown::deregister(hook);
        }
        debug!("Template builder closed");
        outcome
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn stats(&self) -> BatchStats {
        lock(&self.state).stats
    }

    fn sign_and_write(&self, state: &mut BatchState, template: Template) -> Result<()> {
        let id = template.id;
        let entries = template.len();
        let outcome = template
            .sign(&self.signer, &self.recipients)
            .and_then(|signed| state.out.write(&signed));

        match outcome {
            Ok(()) => {
                state.stats.signed += 1;
                debug!(template_id = id, entries, "Signed template");
                Ok(())
            }
            Err(e) => {
                state.stats.failed += 1;
                error!(template_id = id, error = %e, "Failed to sign or write template");
                Err(e)
            }
        }
    }
}

impl RecordSink for TemplateBuilder {
    fn append(
        &self,
        record: &PrivacyRecord,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.consume(record).map_err(Into::into)
    }
}

impl ShutdownHook for TemplateBuilder {
    fn on_shutdown(&self) {
        if let Err(e) = self.close() {
            error!(error = %e, "Failed to flush templates at exit");
        }
    }
}

impl Drop for TemplateBuilder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "Failed to flush templates on drop");
        }
    }
}

impl std::fmt::Debug for TemplateBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateBuilder")
            .field("config", &self.config)
            .field("signer", &self.signer)
            .field("stats", &self.stats())
            .finish()
    }
}
