use std::sync::Arc;
use std::time::Duration;

use nt_core::RequestContext;
use nt_service::ArticleService;
use tracing::Span;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

pub struct AppState {
    pub service: Arc<ArticleService>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(service: Arc<ArticleService>) -> Self {
        Self {
            service,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Deadline-bound context for one request, tied to the handler's span.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_timeout(self.request_timeout).with_span(Span::current())
    }
}
