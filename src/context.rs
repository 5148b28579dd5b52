use crate::dsn::Endpoint;
use crate::event::RequestInfo;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ambient metadata attached to every event a client produces.
///
/// A context is never mutated once built. The `with_*` methods return a new
/// context sharing everything but the replaced field with its parent, so any
/// number of threads can derive from the same parent without locking.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub(crate) endpoint: Option<Arc<Endpoint>>,
    pub(crate) tags: Arc<BTreeMap<String, String>>,
    pub(crate) hostname: Option<Arc<str>>,
    pub(crate) request: Option<Arc<RequestInfo>>,
    pub(crate) extra: Option<Arc<serde_json::Value>>,
}

impl Context {
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_deref()
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn request(&self) -> Option<&RequestInfo> {
        self.request.as_deref()
    }

    pub fn extra(&self) -> Option<&serde_json::Value> {
        self.extra.as_deref()
    }

    /// Derive a context that reports `request` with every event.
    pub fn with_request(&self, request: RequestInfo) -> Context {
        Context {
            request: Some(Arc::new(request)),
            ..self.clone()
        }
    }

    /// Derive a context whose tags are the parent's tags overridden by `tags`.
    /// Empty input yields an unchanged copy.
    pub fn with_tags<I, K, V>(&self, tags: I) -> Context
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut tags = tags.into_iter().peekable();
        if tags.peek().is_none() {
            return self.clone();
        }
        let mut merged = BTreeMap::clone(&self.tags);
        merged.extend(tags.map(|(k, v)| (k.into(), v.into())));
        Context {
            tags: Arc::new(merged),
            ..self.clone()
        }
    }

    /// Derive a context carrying `extra` as the event's `extra` blob. The
    /// value is serialized immediately; if that fails the parent is returned
    /// unchanged.
    pub fn with_extra<T: Serialize + ?Sized>(&self, extra: &T) -> Context {
        match serde_json::to_value(extra) {
            Ok(value) => Context {
                extra: Some(Arc::new(value)),
                ..self.clone()
            },
            Err(_) => self.clone(),
        }
    }

    pub(crate) fn with_endpoint(&self, endpoint: Endpoint) -> Context {
        Context {
            endpoint: Some(Arc::new(endpoint)),
            ..self.clone()
        }
    }

    pub(crate) fn with_hostname(&self, hostname: Option<String>) -> Context {
        Context {
            hostname: hostname.map(Arc::from),
            ..self.clone()
        }
    }

    pub(crate) fn replace_tags(&self, tags: BTreeMap<String, String>) -> Context {
        Context {
            tags: Arc::new(tags),
            ..self.clone()
        }
    }
}
