use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

/// Format of the `timestamp` field expected by the Sentry store API.
pub const SENTRY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Maximum number of frames kept per reported error.
pub const MAX_FRAMES: usize = 3;

/// Wire representation of a single event sent to the Sentry store API.
///
/// Field names follow the Sentry client protocol; optional fields are left
/// out of the JSON document entirely when empty.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "event_id")]
    pub id: String,
    pub message: String,
    pub timestamp: String,
    pub level: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub culprit: Option<String>,
    pub platform: &'static str,
    #[serde(rename = "server_name", skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
    #[serde(rename = "exception", skip_serializing_if = "Option::is_none")]
    pub exceptions: Option<Exceptions>,
    #[serde(rename = "logentry", skip_serializing_if = "Option::is_none")]
    pub details: Option<Details>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestInfo>,
}

/// `exception` interface: serialized as `{"values": [...]}`.
#[derive(Debug, Clone, Serialize)]
pub struct Exceptions {
    pub values: Vec<Exception>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Exception {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "value")]
    pub message: String,
    #[serde(rename = "stacktrace", skip_serializing_if = "Option::is_none")]
    pub trace: Option<StackTrace>,
}

impl Exception {
    /// Wrap a reported error, keeping at most [`MAX_FRAMES`] innermost frames.
    pub fn from_reported(err: &ReportedError) -> Self {
        let trace = if err.frames.is_empty() {
            None
        } else {
            Some(StackTrace {
                frames: err.frames.iter().take(MAX_FRAMES).cloned().collect(),
            })
        };
        Exception {
            kind: err.kind.clone(),
            message: err.message.clone(),
            trace,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StackTrace {
    pub frames: Vec<Frame>,
}

/// One call-stack entry. Index 0 of a trace is the innermost frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    #[serde(rename = "filename", skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub function: String,
    #[serde(rename = "lineno")]
    pub line: u32,
}

impl Frame {
    pub fn new(file: impl Into<String>, function: impl Into<String>, line: u32) -> Self {
        Frame {
            file: file.into(),
            function: function.into(),
            line,
        }
    }
}

/// Capture a [`Frame`] for the enclosing function at the call site.
#[macro_export]
macro_rules! frame {
    () => {{
        fn __raven_here() {}
        fn __raven_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = __raven_name_of(__raven_here);
        let name = name.strip_suffix("::__raven_here").unwrap_or(name);
        $crate::event::Frame::new(file!(), name, line!())
    }};
}

/// `logentry` interface: the format string with its rendered parameters.
#[derive(Debug, Clone, Serialize)]
pub struct Details {
    pub formatted: String,
    pub message: String,
    pub params: Vec<String>,
}

/// `request` interface: snapshot of the HTTP request being served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestInfo {
    pub url: String,
    pub method: String,
    #[serde(rename = "query_string", skip_serializing_if = "String::is_empty")]
    pub query: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl RequestInfo {
    /// Build a snapshot from request parts as seen by a server.
    ///
    /// The scheme is switched to `https` when a proxy reports it through the
    /// `X-Forwarded-Proto` header. Repeated header values are joined with
    /// `", "`; non-UTF-8 values are rendered lossily.
    pub fn from_parts(
        method: &reqwest::Method,
        url: &reqwest::Url,
        headers: &reqwest::header::HeaderMap,
    ) -> Self {
        let mut url = url.clone();
        let forwarded_https = headers
            .get("x-forwarded-proto")
            .map_or(false, |v| v.as_bytes().eq_ignore_ascii_case(b"https"));
        if forwarded_https {
            // Only fails for cannot-be-a-base URLs, which never come from a server.
            let _ = url.set_scheme("https");
        }

        let mut joined: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in headers {
            let value = String::from_utf8_lossy(value.as_bytes());
            joined
                .entry(name.as_str().to_string())
                .and_modify(|v| {
                    v.push_str(", ");
                    v.push_str(&value);
                })
                .or_insert_with(|| value.into_owned());
        }

        RequestInfo {
            query: url.query().unwrap_or_default().to_string(),
            url: url.to_string(),
            method: method.as_str().to_string(),
            headers: joined,
        }
    }
}

/// Sentry log entry level. Ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Severity {
    Fatal,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Fatal => "fatal",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }

    /// Raise the level to at least `Error`; more severe levels are kept.
    pub fn escalate(self) -> Self {
        self.min(Severity::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl From<&tracing::Level> for Severity {
    fn from(level: &tracing::Level) -> Self {
        if *level == tracing::Level::ERROR {
            Severity::Error
        } else if *level == tracing::Level::WARN {
            Severity::Warning
        } else if *level == tracing::Level::INFO {
            Severity::Info
        } else {
            Severity::Debug
        }
    }
}

/// An error captured for reporting: message, type tag and optional call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    pub kind: String,
    pub message: String,
    pub frames: Vec<Frame>,
}

impl ReportedError {
    /// Capture an error value. The type tag is the last path segment of the
    /// error's Rust type name.
    pub fn new<E: Error + ?Sized>(err: &E) -> Self {
        let name = std::any::type_name::<E>();
        let name = name.split('<').next().unwrap_or(name);
        let kind = name.rsplit("::").next().unwrap_or("error");
        ReportedError {
            kind: if kind.is_empty() { "error" } else { kind }.to_string(),
            message: err.to_string(),
            frames: Vec::new(),
        }
    }

    /// Build from a plain message with the generic `error` type tag.
    pub fn msg(message: impl Into<String>) -> Self {
        ReportedError {
            kind: "error".to_string(),
            message: message.into(),
            frames: Vec::new(),
        }
    }

    /// Attach a call stack, innermost frame first.
    pub fn with_trace(mut self, frames: impl IntoIterator<Item = Frame>) -> Self {
        self.frames = frames.into_iter().collect();
        self
    }

    /// Override the type tag.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Function name of the innermost frame, if a non-empty trace is attached.
    pub fn culprit(&self) -> Option<&str> {
        self.frames
            .first()
            .map(|f| f.function.as_str())
            .filter(|f| !f.is_empty())
    }
}

impl fmt::Display for ReportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("disk full")]
    struct DiskFull;

    #[test]
    fn escalate_never_lowers_severity() {
        assert_eq!(Severity::Info.escalate(), Severity::Error);
        assert_eq!(Severity::Debug.escalate(), Severity::Error);
        assert_eq!(Severity::Error.escalate(), Severity::Error);
        assert_eq!(Severity::Fatal.escalate(), Severity::Fatal);
    }

    #[test]
    fn reported_error_uses_type_name_as_kind() {
        let err = ReportedError::new(&DiskFull);
        assert_eq!(err.kind, "DiskFull");
        assert_eq!(err.message, "disk full");
        assert!(err.culprit().is_none());
    }

    #[test]
    fn frame_macro_names_enclosing_function() {
        let frame = crate::frame!();
        assert!(frame.function.ends_with("frame_macro_names_enclosing_function"));
        assert!(frame.file.ends_with("event.rs"));
        assert!(frame.line > 0);
    }

    #[test]
    fn exception_truncates_to_innermost_frames() {
        let frames = (0..5).map(|i| Frame::new("lib.rs", format!("f{i}"), i));
        let exc = Exception::from_reported(&ReportedError::msg("boom").with_trace(frames));
        let trace = exc.trace.expect("trace");
        let names: Vec<_> = trace.frames.iter().map(|f| f.function.as_str()).collect();
        assert_eq!(names, ["f0", "f1", "f2"]);
    }

    #[test]
    fn request_info_honours_forwarded_proto() {
        let url = reqwest::Url::parse("http://example.com/login?next=%2Fhome").unwrap();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        headers.append("accept", "text/html".parse().unwrap());
        headers.append("accept", "application/json".parse().unwrap());

        let info = RequestInfo::from_parts(&reqwest::Method::POST, &url, &headers);
        assert_eq!(info.url, "https://example.com/login?next=%2Fhome");
        assert_eq!(info.method, "POST");
        assert_eq!(info.query, "next=%2Fhome");
        assert_eq!(info.headers["accept"], "text/html, application/json");
    }
}
