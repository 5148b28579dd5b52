use crate::encoder::{render_format, render_print, render_println, Arg};

/// The three call shapes of a line-oriented logger.
///
/// [`Client`](crate::client::Client) implements this trait, so code written
/// against `&dyn Logger` can log either locally or to Sentry. A client also
/// takes an optional `Logger` as its fallback: every call is mirrored to it,
/// and delivery and overflow failures are reported there.
pub trait Logger: Send + Sync {
    fn print(&self, args: &[Arg]);

    /// `format` is a runtime template where each `{}` takes the next argument.
    fn printf(&self, format: &str, args: &[Arg]);

    fn println(&self, args: &[Arg]);
}

/// Fallback logger that forwards to `tracing` at WARN level.
///
/// Events are emitted under the `raven` target, which
/// [`RavenLayer`](crate::layer::RavenLayer) never ships back to Sentry.
#[derive(Clone, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn print(&self, args: &[Arg]) {
        tracing::warn!(target: "raven", "{}", render_print(args));
    }

    fn printf(&self, format: &str, args: &[Arg]) {
        tracing::warn!(target: "raven", "{}", render_format(format, args));
    }

    fn println(&self, args: &[Arg]) {
        tracing::warn!(target: "raven", "{}", render_println(args).trim_end());
    }
}
