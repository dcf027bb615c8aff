pub mod fake;

use crate::errors::Result;
use crate::replay::ReplaySession;
use crate::trace::Trace;
use async_trait::async_trait;
use std::sync::Arc;

/// Per-invocation context the runner hands to an adapter.
///
/// Middleware keys its decisions on `position` (the test's index in the batch),
/// never on arrival order. `replay` is set when sub-calls must be served from a recording.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub test_name: Option<String>,
    pub position: Option<usize>,
    pub replay: Option<Arc<ReplaySession>>,
}

impl InvokeOptions {
    pub fn for_test(test_name: impl Into<String>, position: usize) -> Self {
        Self {
            test_name: Some(test_name.into()),
            position: Some(position),
            replay: None,
        }
    }

    pub fn with_replay(mut self, session: Arc<ReplaySession>) -> Self {
        self.replay = Some(session);
        self
    }
}

/// The capability under test: turns an input into a trace.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, input: &str, opts: InvokeOptions) -> Result<Trace>;
}

#[async_trait]
impl<A: Adapter + ?Sized> Adapter for Arc<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn invoke(&self, input: &str, opts: InvokeOptions) -> Result<Trace> {
        (**self).invoke(input, opts).await
    }
}
