//! Dual-view log records.
//!
//! A [`PrivacyRecord`] is built once from a message template and its
//! parameters. It keeps the rewritten template and one sanitizer per bound
//! parameter and renders two independent views on demand:
//!
//! - the **sanitized** message, safe for ordinary log sinks
//! - the **critical** message, with full information for authorized use

use crate::error::Result;
use crate::placeholder::{self, Placeholder};
use crate::registry::ParamSanitizerRegistry;
use crate::sanitizer::{IdentitySanitizer, ParamSanitizer};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use tracing::Level;

/// A log call as received from the host logging framework.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: Level,
    /// Logger name.
    pub target: String,
    /// Message template with `{}` / `{tag}` placeholders.
    pub template: String,
    pub params: Vec<String>,
    /// Rendered error chain, if any.
    pub error: Option<String>,
    pub thread: String,
    /// Context fields (MDC).
    pub fields: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    /// A new event stamped with the current time and thread.
    pub fn new(level: Level, target: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            level,
            target: target.into(),
            template: template.into(),
            params: Vec::new(),
            error: None,
            thread: current_thread_name(),
            fields: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_param(mut self, param: impl ToString) -> Self {
        self.params.push(param.to_string());
        self
    }

    pub fn with_params<I, T>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.params.extend(params.into_iter().map(|p| p.to_string()));
        self
    }

    /// Attach an error; its source chain is rendered one cause per line.
    pub fn with_error(mut self, error: &(dyn std::error::Error + 'static)) -> Self {
        self.error = Some(render_error(error));
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = thread.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

fn current_thread_name() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}

/// Render an error and its sources, `Caused by:` per source.
pub fn render_error(error: &(dyn std::error::Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str("\nCaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// A log record with a sanitized and a critical view.
pub struct PrivacyRecord {
    level: Level,
    target: String,
    thread: String,
    timestamp: DateTime<Utc>,
    fields: BTreeMap<String, String>,
    error: Option<String>,
    rewritten: String,
    sanitizers: Vec<Box<dyn ParamSanitizer>>,
    consumed: usize,
    sanitized: OnceCell<String>,
    critical: OnceCell<String>,
}

impl PrivacyRecord {
    /// Build a record from a bare template and parameters.
    pub fn build(registry: &ParamSanitizerRegistry, template: &str, params: Vec<String>) -> Self {
        Self::from_event(
            registry,
            LogEvent {
                params,
                ..LogEvent::new(Level::INFO, "", template)
            },
        )
    }

    /// Build a record from a host log event.
    pub fn from_event(registry: &ParamSanitizerRegistry, event: LogEvent) -> Self {
        let LogEvent {
            level,
            target,
            template,
            params,
            error,
            thread,
            fields,
            timestamp,
        } = event;

        let param_count = params.len();
        let mut params: Vec<Option<String>> = params.into_iter().map(Some).collect();
        let parsed = placeholder::parse(&template, param_count, |tag, index, placeholder| {
            let value = params.get_mut(index)?.take()?;
            bind(registry, tag, value, placeholder)
        });

        Self {
            level,
            target,
            thread,
            timestamp,
            fields,
            error,
            rewritten: parsed.rewritten,
            sanitizers: parsed.bound,
            consumed: parsed.consumed,
            sanitized: OnceCell::new(),
            critical: OnceCell::new(),
        }
    }

    /// The message with every parameter in its redacted form.
    pub fn sanitized_message(&self) -> Result<&str> {
        self.sanitized
            .get_or_try_init(|| self.render(|s| s.sanitized()))
            .map(String::as_str)
    }

    /// The message with every parameter in full.
    pub fn critical_message(&self) -> Result<&str> {
        self.critical
            .get_or_try_init(|| self.render(|s| s.critical()))
            .map(String::as_str)
    }

    fn render<'a, F>(&'a self, value: F) -> Result<String>
    where
        F: Fn(&'a dyn ParamSanitizer) -> Result<&'a str>,
    {
        let values = self
            .sanitizers
            .iter()
            .map(|s| Ok((s.placeholder().start, value(s.as_ref())?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(placeholder::render(&self.rewritten, values))
    }

    /// Bound sanitizers in template order.
    pub fn sanitizers(&self) -> &[Box<dyn ParamSanitizer>] {
        &self.sanitizers
    }

    /// Template with each bound placeholder collapsed to `{}`.
    pub fn rewritten_template(&self) -> &str {
        &self.rewritten
    }

    /// Number of parameters consumed by the template, dropped ones included.
    pub fn consumed_params(&self) -> usize {
        self.consumed
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn thread(&self) -> &str {
        &self.thread
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

fn bind(
    registry: &ParamSanitizerRegistry,
    tag: &str,
    value: String,
    placeholder: Placeholder,
) -> Option<Box<dyn ParamSanitizer>> {
    if tag.is_empty() {
        return Some(Box::new(IdentitySanitizer::new(value, placeholder)));
    }
    registry.create(tag, value, placeholder)
}

impl std::fmt::Debug for PrivacyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tags: Vec<&str> = self
            .sanitizers
            .iter()
            .map(|s| s.placeholder().tag.as_str())
            .collect();
        f.debug_struct("PrivacyRecord")
            .field("level", &self.level)
            .field("target", &self.target)
            .field("template", &self.rewritten)
            .field("tags", &tags)
            .finish()
    }
}

/// Destination for built records.
pub trait RecordSink: Send + Sync {
    fn append(
        &self,
        record: &PrivacyRecord,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
