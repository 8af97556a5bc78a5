use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{Instrument, Span};

use crate::{Error, Result};

/// Per-request deadline and tracing span.
///
/// Every call that leaves the process (storage, embeddings, event lookups)
/// goes through [`RequestContext::guard`], so an expired deadline stops the
/// request at the next external call instead of letting it run on.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Option<Instant>,
    span: Span,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            deadline: None,
            span: Span::current(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            span: Span::current(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    /// Run an external call under this context's span and deadline.
    pub async fn guard<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_expired() {
            return Err(Error::Timeout(operation.to_string()));
        }
        let call = call.instrument(self.span.clone());
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, call)
                .await
                .map_err(|_| Error::Timeout(operation.to_string()))?,
            None => call.await,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
