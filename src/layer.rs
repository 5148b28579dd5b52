use crate::client::Client;
use crate::encoder::{Arg, Record};
use crate::event::{Frame, ReportedError, Severity};
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns events into Sentry reports through
/// a [`Client`].
///
/// By default only events at `ERROR` level are forwarded. The event's
/// `message` becomes the report text, error-valued fields become exceptions
/// and every other field goes to the event's `extra` data. Events with the
/// `raven` target, which this crate uses for its own diagnostics, are never
/// forwarded.
pub struct RavenLayer {
    client: Client,
    min_level: Level,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events handed to the client.
    pub forwarded_events: Arc<AtomicU64>,
}

impl RavenLayer {
    pub fn new(client: Client) -> Self {
        Self::with_level(client, Level::ERROR)
    }

    /// Forward events at `min_level` or more severe.
    pub fn with_level(client: Client, min_level: Level) -> Self {
        Self {
            client,
            min_level,
            total_events: Arc::new(AtomicU64::new(0)),
            forwarded_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<S> Layer<S> for RavenLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        // Internal diagnostics all use the `raven` target.
        if *meta.level() > self.min_level || meta.target() == "raven" {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let text = visitor.message.unwrap_or_else(|| meta.name().to_string());
        let callsite = Frame::new(
            meta.file().unwrap_or_default(),
            meta.module_path().unwrap_or_else(|| meta.target()),
            meta.line().unwrap_or_default(),
        );
        let args: Vec<Arg> = visitor
            .errors
            .into_iter()
            .map(|err| {
                if err.frames.is_empty() {
                    err.with_trace([callsite.clone()])
                } else {
                    err
                }
            })
            .map(Arg::from)
            .collect();

        let client = if visitor.fields.is_empty() {
            self.client.clone()
        } else {
            self.client.with_extra(&visitor.fields)
        };
        client.report(&Record {
            text,
            format: None,
            args: &args,
            level: Severity::from(meta.level()),
        });
        self.forwarded_events.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
pub struct FieldVisitor {
    pub fields: BTreeMap<String, serde_json::Value>,
    pub message: Option<String>,
    pub errors: Vec<ReportedError>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_error(&mut self, _field: &Field, value: &(dyn Error + 'static)) {
        self.errors.push(ReportedError::new(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
        }
    }
}
