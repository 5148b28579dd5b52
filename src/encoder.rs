//! Turns a log call into a serialized Sentry event.
//!
//! Encoding runs on the producer's thread and only reads the client
//! [`Context`]; nothing here touches shared mutable state.

use crate::context::Context;
use crate::event::{Details, Event, Exception, Exceptions, ReportedError, Severity, SENTRY_TIME_FORMAT};
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt;

/// Platform tag reported with every event.
pub const PLATFORM: &str = "rust";

/// One argument of a log call.
///
/// Errors are kept apart from plain values so the encoder can raise the
/// event's severity and attach exception data without inspecting values at
/// runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Value(String),
    /// `None` stands for an absent error; it renders as `<nil>` and does not
    /// affect the event.
    Error(Option<ReportedError>),
}

impl Arg {
    pub fn value(v: impl fmt::Display) -> Self {
        Arg::Value(v.to_string())
    }

    pub fn error<E: Error + ?Sized>(err: &E) -> Self {
        Arg::Error(Some(ReportedError::new(err)))
    }

    /// Argument from a possibly absent error, e.g. `result.as_ref().err()`.
    pub fn maybe_error<E: Error>(err: Option<&E>) -> Self {
        Arg::Error(err.map(|e| ReportedError::new(e)))
    }

    fn is_string_value(&self) -> bool {
        matches!(self, Arg::Value(_))
    }

    fn reported(&self) -> Option<&ReportedError> {
        match self {
            Arg::Error(Some(e)) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(v) => f.write_str(v),
            Arg::Error(Some(e)) => f.write_str(&e.message),
            Arg::Error(None) => f.write_str("<nil>"),
        }
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Value(v.to_string())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::Value(v)
    }
}

impl From<ReportedError> for Arg {
    fn from(e: ReportedError) -> Self {
        Arg::Error(Some(e))
    }
}

/// Render arguments the way `print` does: operands are concatenated, with a
/// space between two neighbours when neither is a plain value.
pub fn render_print(args: &[Arg]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !arg.is_string_value() && !args[i - 1].is_string_value() {
            out.push(' ');
        }
        out.push_str(&arg.to_string());
    }
    out
}

/// Render arguments the way `println` does: space separated, newline ended.
pub fn render_println(args: &[Arg]) -> String {
    let mut out = args.iter().map(Arg::to_string).collect::<Vec<_>>().join(" ");
    out.push('\n');
    out
}

/// Render a runtime format template. Each `{}` takes the next argument,
/// `{{` and `}}` are literal braces. Placeholders with no argument left are
/// kept verbatim; surplus arguments are not rendered.
pub fn render_format(format: &str, args: &[Arg]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut next = args.iter();
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('{', Some('{')) | ('}', Some('}')) => {
                chars.next();
                out.push(c);
            }
            ('{', Some('}')) => {
                chars.next();
                match next.next() {
                    Some(arg) => out.push_str(&arg.to_string()),
                    None => out.push_str("{}"),
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Raw material for one event.
#[derive(Debug, Clone, Default)]
pub struct Record<'a> {
    /// Fully rendered text, as it would appear in a log.
    pub text: String,
    /// Format template used to render `text`, if any.
    pub format: Option<&'a str>,
    pub args: &'a [Arg],
    /// Level before escalation; producer calls use `Info`.
    pub level: Severity,
}

/// A queued item: the serialized event plus what is needed to report a
/// failed delivery.
#[derive(Debug, Clone)]
pub struct Message {
    /// Text used only for logging a failed send.
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// JSON-encoded event; empty if encoding failed.
    pub payload: Vec<u8>,
}

/// Build the event for `record` and serialize it.
pub fn encode(record: &Record<'_>, context: &Context) -> Message {
    let timestamp = Utc::now();
    let event = build_event(record, context, timestamp);
    let payload = serde_json::to_vec(&event).unwrap_or_default();
    Message {
        text: record.text.clone(),
        timestamp,
        payload,
    }
}

pub(crate) fn build_event(record: &Record<'_>, context: &Context, timestamp: DateTime<Utc>) -> Event {
    let errors: Vec<&ReportedError> = record.args.iter().filter_map(Arg::reported).collect();

    let level = if errors.is_empty() {
        record.level
    } else {
        record.level.escalate()
    };

    let details = match record.format {
        Some(format) if !format.is_empty() && !record.args.is_empty() => Some(Details {
            formatted: record.text.clone(),
            message: format.to_string(),
            params: record.args.iter().map(Arg::to_string).collect(),
        }),
        _ => None,
    };

    let culprit = errors
        .first()
        .and_then(|e| e.culprit())
        .map(str::to_string);

    let exceptions = if errors.is_empty() {
        None
    } else {
        Some(Exceptions {
            values: errors.iter().map(|e| Exception::from_reported(e)).collect(),
        })
    };

    Event {
        id: uuid::Uuid::new_v4().simple().to_string(),
        message: record.text.clone(),
        timestamp: timestamp.format(SENTRY_TIME_FORMAT).to_string(),
        level,
        culprit,
        platform: PLATFORM,
        hostname: context.hostname().map(str::to_string),
        tags: context.tags().clone(),
        extra: context.extra().cloned(),
        exceptions,
        details,
        request: context.request().cloned(),
    }
}
