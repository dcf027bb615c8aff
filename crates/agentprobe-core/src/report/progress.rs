//! Run progress. The runner emits done/total after each test completes,
//! in completion order; callers render it however they like.

use std::sync::Arc;

/// One progress update: how many tests are done and the batch size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
}

/// Sink for progress events. Must be cheap; it is called from the collecting loop.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
