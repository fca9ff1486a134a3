//! Run progress. The engine emits one event per finished pair, in completion
//! order; the console layer consumes them through a sink.

use crate::model::{OutcomeKey, PairState};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
    pub key: OutcomeKey,
    pub state: PairState,
}

/// Called once per finished pair. Implementations may throttle.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
