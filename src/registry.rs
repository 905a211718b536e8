//! Service and push handler tables.
//!
//! Both registries map a name to an async handler taking the inbound payload
//! and producing either a result or an error value, which the session turns
//! into a `Response` with `Status=true` or `Status=false`.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

/// An async handler for inbound `Request` or `Push` envelopes.
///
/// Implemented for any `Fn(Value) -> impl Future<Output = Result<Value, Value>>`,
/// so plain async closures can be registered directly.
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    /// Handle one inbound payload.
    ///
    /// # Errors
    ///
    /// The error value is sent back verbatim as the data of a failed response.
    async fn call(&self, data: Value) -> Result<Value, Value>;
}

#[async_trait::async_trait]
impl<F, Fut> Service for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, Value>> + Send + 'static,
{
    async fn call(&self, data: Value) -> Result<Value, Value> {
        (self)(data).await
    }
}

/// Name → handler mapping shared by the service and push registries.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: BTreeMap<String, Arc<dyn Service>>,
}

impl HandlerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handler` under `name`, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, handler: Arc<dyn Service>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Remove the handler for `name`. Returns whether one was registered.
    pub fn remove(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.handlers.get(name).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
