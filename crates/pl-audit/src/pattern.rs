//! Conversion patterns.
//!
//! A pattern such as `%date %level [%thread] %logger - %msg%exception` is
//! compiled into a chain of converters. Each converter extracts one piece of
//! a [`PrivacyRecord`]; literal text between them is kept as is.
//!
//! | word                         | output                                  |
//! |------------------------------|-----------------------------------------|
//! | `%d`, `%date{fmt}`           | timestamp, `fmt` in strftime syntax     |
//! | `%p`, `%le`, `%level`        | level                                   |
//! | `%t`, `%thread`              | thread name                             |
//! | `%c`, `%lo`, `%logger`       | logger name                             |
//! | `%m`, `%msg`, `%message`     | message                                 |
//! | `%ex`, `%exception`          | error chain on a new line, if any       |
//! | `%X`, `%mdc{key}`            | one context field, or all of them       |
//! | `%n`                         | newline                                 |
//! | `%%`                         | a percent sign                          |
//!
//! Padding modifiers (`%-5level`) are accepted and ignored.
//!
//! Converters other than the message can be sanitized too: when the registry
//! holds a factory under the converter's name (`date`, `level`, `thread`,
//! `logger`, `exception`, the context key, or `MDC` for all fields) the
//! converted text goes through it like a tagged parameter.

use crate::template::{Entry, View};
use crate::{AuditError, Result};
use chrono::format::{Item, StrftimeItems};
use once_cell::sync::Lazy;
use pl_redact::{ParamSanitizer, ParamSanitizerRegistry, Placeholder, PrivacyRecord};
use regex::Regex;
use std::borrow::Cow;

/// Default conversion pattern.
pub const DEFAULT_PATTERN: &str = "%date %level [%thread] %logger - %msg%exception";

/// Default timestamp format.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

static RE_CONVERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"%(?:(%)|-?[0-9]*(?:\.-?[0-9]+)?([a-zA-Z]+)(?:\{([^{}]*)\})?)").unwrap()
});

/// One step of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Converter {
    Literal(String),
    Date(String),
    Level,
    Thread,
    Logger,
    Message,
    Exception,
    Mdc(Option<String>),
}

impl Converter {
    /// Registry key consulted for sanitizing this converter's output.
    pub fn name(&self) -> Option<Cow<'_, str>> {
        match self {
            Converter::Literal(_) | Converter::Message => None,
            Converter::Date(_) => Some(Cow::Borrowed("date")),
            Converter::Level => Some(Cow::Borrowed("level")),
            Converter::Thread => Some(Cow::Borrowed("thread")),
            Converter::Logger => Some(Cow::Borrowed("logger")),
            Converter::Exception => Some(Cow::Borrowed("exception")),
            Converter::Mdc(Some(key)) => Some(Cow::Borrowed(key.as_str())),
            Converter::Mdc(None) => Some(Cow::Borrowed("MDC")),
        }
    }

    /// Raw output for every converter except the message.
    fn convert(&self, record: &PrivacyRecord) -> String {
        match self {
            Converter::Literal(text) => text.clone(),
            Converter::Date(format) => record.timestamp().format(format).to_string(),
            Converter::Level => record.level().to_string(),
            Converter::Thread => record.thread().to_string(),
            Converter::Logger => record.target().to_string(),
            Converter::Exception => record
                .error()
                .map(|e| format!("\n{}", e))
                .unwrap_or_default(),
            Converter::Mdc(Some(key)) => record.field(key).unwrap_or_default().to_string(),
            Converter::Mdc(None) => record
                .fields()
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(", "),
            Converter::Message => String::new(),
        }
    }
}

/// A compiled conversion pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    converters: Vec<Converter>,
}

impl Default for Pattern {
    fn default() -> Self {
        Self::parse(DEFAULT_PATTERN).unwrap_or_else(|_| Self {
            converters: vec![Converter::Message],
        })
    }
}

impl Pattern {
    /// Compile `pattern`.
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut converters = Vec::new();
        let mut literal = String::new();
        let mut cur_pos = 0;

        for caps in RE_CONVERSION.captures_iter(pattern) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            literal.push_str(&pattern[cur_pos..whole.start()]);
            cur_pos = whole.end();

            if caps.get(1).is_some() {
                literal.push('%');
                continue;
            }
            let word = caps.get(2).map_or("", |m| m.as_str());
            let option = caps.get(3).map(|m| m.as_str().to_string());

            let converter = match word {
                "n" => {
                    literal.push('\n');
                    continue;
                }
                "d" | "date" => {
                    let format = option.unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string());
                    check_date_format(&format)?;
                    Converter::Date(format)
                }
                "p" | "le" | "level" => Converter::Level,
                "t" | "thread" => Converter::Thread,
                "c" | "lo" | "logger" => Converter::Logger,
                "m" | "msg" | "message" => Converter::Message,
                "ex" | "exception" | "throwable" => Converter::Exception,
                "X" | "mdc" => Converter::Mdc(option.filter(|k| !k.is_empty())),
                other => {
                    return Err(AuditError::Pattern(format!(
                        "unknown conversion word %{}",
                        other
                    )))
                }
            };

            if !literal.is_empty() {
                converters.push(Converter::Literal(std::mem::take(&mut literal)));
            }
            converters.push(converter);
        }

        literal.push_str(&pattern[cur_pos..]);
        if !literal.is_empty() {
            converters.push(Converter::Literal(literal));
        }
        Ok(Self { converters })
    }

    pub fn converters(&self) -> &[Converter] {
        &self.converters
    }

    /// Template entries for `record`.
    ///
    /// Literal text and values whose views agree become fixed runs; differing
    /// values become exchangeable pairs. Converter output without a sanitizer
    /// factory becomes a blank entry.
    pub fn entries(
        &self,
        record: &PrivacyRecord,
        registry: &ParamSanitizerRegistry,
    ) -> Result<Vec<Entry>> {
        let mut out = EntryCollector::default();

        for converter in &self.converters {
            match converter {
                Converter::Literal(text) => out.fixed(text),
                Converter::Message => {
                    let rewritten = record.rewritten_template();
                    let mut cur_pos = 0;
                    for sanitizer in record.sanitizers() {
                        let placeholder = sanitizer.placeholder();
                        out.fixed(&rewritten[cur_pos..placeholder.start]);
                        out.value(sanitizer.as_ref())?;
                        cur_pos = placeholder.end();
                    }
                    out.fixed(&rewritten[cur_pos..]);
                }
                other => {
                    let text = other.convert(record);
                    if text.is_empty() {
                        continue;
                    }
                    match sanitize(other, text, registry) {
                        Converted::Sanitized(sanitizer) => out.value(sanitizer.as_ref())?,
                        Converted::Raw(text) => out.blank(text),
                        Converted::Dropped => {}
                    }
                }
            }
        }
        Ok(out.finish())
    }

    /// Render `record` as one line in the given view.
    pub fn render(
        &self,
        record: &PrivacyRecord,
        registry: Option<&ParamSanitizerRegistry>,
        view: View,
    ) -> Result<String> {
        let mut line = String::new();
        for converter in &self.converters {
            match converter {
                Converter::Literal(text) => line.push_str(text),
                Converter::Message => line.push_str(match view {
                    View::Critical => record.critical_message()?,
                    View::Sanitized => record.sanitized_message()?,
                }),
                other => {
                    let text = other.convert(record);
                    let converted = match registry {
                        Some(registry) if !text.is_empty() => sanitize(other, text, registry),
                        _ => Converted::Raw(text),
                    };
                    match converted {
                        Converted::Sanitized(sanitizer) => line.push_str(match view {
                            View::Critical => sanitizer.critical()?,
                            View::Sanitized => sanitizer.sanitized()?,
                        }),
                        Converted::Raw(text) => line.push_str(&text),
                        Converted::Dropped => {}
                    }
                }
            }
        }
        Ok(line)
    }
}

fn check_date_format(format: &str) -> Result<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(AuditError::Pattern(format!("invalid date format {:?}", format)));
    }
    Ok(())
}

enum Converted {
    Sanitized(Box<dyn ParamSanitizer>),
    Raw(String),
    Dropped,
}

fn sanitize(converter: &Converter, text: String, registry: &ParamSanitizerRegistry) -> Converted {
    let Some(name) = converter.name() else {
        return Converted::Raw(text);
    };
    if !registry.contains(&name) {
        return Converted::Raw(text);
    }
    match registry.create(&name, text, Placeholder::detached(&*name)) {
        Some(sanitizer) => Converted::Sanitized(sanitizer),
        // Registered but not started: fail closed.
        None => Converted::Dropped,
    }
}

/// Coalesces adjacent fixed text into one entry.
#[derive(Default)]
struct EntryCollector {
    entries: Vec<Entry>,
    fixed: String,
}

impl EntryCollector {
    fn fixed(&mut self, text: &str) {
        self.fixed.push_str(text);
    }

    fn flush(&mut self) {
        if !self.fixed.is_empty() {
            self.entries
                .push(Entry::fixed(std::mem::take(&mut self.fixed)));
        }
    }

    fn value(&mut self, sanitizer: &dyn ParamSanitizer) -> pl_redact::Result<()> {
        if sanitizer.critical_equals_sanitized()? {
            self.fixed(sanitizer.critical()?);
        } else {
            let critical = sanitizer.critical()?.to_string();
            let sanitized = sanitizer.sanitized()?.to_string();
            self.flush();
            self.entries.push(Entry::exchangeable(critical, sanitized));
        }
        Ok(())
    }

    fn blank(&mut self, text: String) {
        self.flush();
        self.entries.push(Entry::blank(text));
    }

    fn finish(mut self) -> Vec<Entry> {
        self.flush();
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_redact::{BlindingSanitizerFactory, LogEvent};
    use tracing::Level;

    fn registry() -> ParamSanitizerRegistry {
        let mut registry = ParamSanitizerRegistry::new();
        registry
            .register("user", BlindingSanitizerFactory::new().with_mask("###"))
            .unwrap();
        registry
    }

    fn record(registry: &ParamSanitizerRegistry) -> PrivacyRecord {
        let event = LogEvent::new(Level::INFO, "auth", "User {user} logged in from {}")
            .with_params(["alice", "10.0.0.1"])
            .with_thread("main")
            .with_field("session", "s-1");
        PrivacyRecord::from_event(registry, event)
    }

    #[test]
    fn test_parse_default_pattern() {
        let pattern = Pattern::parse(DEFAULT_PATTERN).unwrap();
        assert_eq!(
            pattern.converters(),
            &[
                Converter::Date(DEFAULT_DATE_FORMAT.to_string()),
                Converter::Literal(" ".into()),
                Converter::Level,
                Converter::Literal(" [".into()),
                Converter::Thread,
                Converter::Literal("] ".into()),
                Converter::Logger,
                Converter::Literal(" - ".into()),
                Converter::Message,
                Converter::Exception,
            ]
        );
    }

    #[test]
    fn test_parse_options_escapes_and_modifiers() {
        let pattern = Pattern::parse("%-5p 100%% %mdc{session}%n%X").unwrap();
        assert_eq!(
            pattern.converters(),
            &[
                Converter::Level,
                Converter::Literal(" 100% ".into()),
                Converter::Mdc(Some("session".into())),
                Converter::Literal("\n".into()),
                Converter::Mdc(None),
            ]
        );
    }

    #[test]
    fn test_unknown_word_rejected() {
        assert!(matches!(
            Pattern::parse("%bogus"),
            Err(AuditError::Pattern(_))
        ));
    }

    #[test]
    fn test_message_entries() {
        let registry = registry();
        let pattern = Pattern::parse("%msg").unwrap();
        let entries = pattern.entries(&record(&registry), &registry).unwrap();
        assert_eq!(
            entries,
            vec![
                Entry::fixed("User "),
                Entry::exchangeable("alice", "###"),
                Entry::fixed(" logged in from 10.0.0.1"),
            ]
        );
    }

    #[test]
    fn test_unsanitized_converters_are_blank() {
        let registry = registry();
        let pattern = Pattern::parse("[%thread] %msg").unwrap();
        let entries = pattern.entries(&record(&registry), &registry).unwrap();
        assert_eq!(entries[0], Entry::fixed("["));
        assert_eq!(entries[1], Entry::blank("main"));
        assert_eq!(entries[2], Entry::fixed("] User "));
    }

    #[test]
    fn test_converter_sanitized_by_name() {
        let mut registry = registry();
        registry
            .register("session", BlindingSanitizerFactory::new())
            .unwrap();
        let pattern = Pattern::parse("%mdc{session} %msg").unwrap();
        let rec = record(&registry);

        let entries = pattern.entries(&rec, &registry).unwrap();
        assert_eq!(entries[0], Entry::exchangeable("s-1", "*****"));

        let line = pattern.render(&rec, Some(&registry), View::Sanitized).unwrap();
        assert_eq!(line, "***** User ### logged in from 10.0.0.1");
        let line = pattern.render(&rec, Some(&registry), View::Critical).unwrap();
        assert_eq!(line, "s-1 User alice logged in from 10.0.0.1");
    }

    #[test]
    fn test_empty_exception_emits_nothing() {
        let registry = registry();
        let pattern = Pattern::parse("%level%exception").unwrap();
        let entries = pattern.entries(&record(&registry), &registry).unwrap();
        assert_eq!(entries, vec![Entry::blank("INFO")]);
    }

    #[test]
    fn test_invalid_date_format() {
        assert!(Pattern::parse("%date{%Q}").is_err());
        assert!(Pattern::parse("%d{%H:%M}").is_ok());
    }
}
