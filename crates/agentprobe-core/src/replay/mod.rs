//! Positional replay of recorded sub-calls.
//!
//! The Nth model (tool) call of a live execution is served by the Nth recorded model
//! (tool) call. Asking for more calls than were recorded fails with
//! [`ProbeError::ReplayExhausted`]; there is no fallback to a live call.

use crate::errors::{CallKind, ProbeError, Result};
use crate::providers::{Adapter, InvokeOptions};
use crate::trace::diff::{tool_call_diffs, DiffItem};
use crate::trace::{LlmCall, ToolCall, Trace};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

/// Overrides the recorded output of a tool, given the recorded input.
pub type ToolMock = Arc<
    dyn Fn(&serde_json::Value) -> std::result::Result<serde_json::Value, String> + Send + Sync,
>;

#[derive(Debug, Default, Clone, Copy)]
struct Cursor {
    model: usize,
    tool: usize,
}

/// Cursor over one recording. One session serves exactly one invocation.
pub struct ReplaySession {
    recording: Arc<Trace>,
    cursor: Mutex<Cursor>,
    tool_mocks: HashMap<String, ToolMock>,
}

impl std::fmt::Debug for ReplaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaySession")
            .field("recording", &self.recording.trace_id)
            .field("consumed", &self.consumed())
            .field("mocked_tools", &self.tool_mocks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ReplaySession {
    pub fn new(recording: Arc<Trace>) -> Self {
        Self {
            recording,
            cursor: Mutex::new(Cursor::default()),
            tool_mocks: HashMap::new(),
        }
    }

    pub fn recording(&self) -> &Trace {
        &self.recording
    }

    pub fn next_model(&self) -> Result<LlmCall> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let recorded = self.recording.llm_calls.len();
        let Some(call) = self.recording.llm_calls.get(cursor.model) else {
            return Err(ProbeError::ReplayExhausted {
                kind: CallKind::Model,
                requested: cursor.model + 1,
                recorded,
            });
        };
        cursor.model += 1;
        tracing::debug!(position = cursor.model, recorded, "replay: served model call");
        Ok(call.clone())
    }

    pub fn next_tool(&self) -> Result<ToolCall> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let recorded = self.recording.tool_calls.len();
        let Some(call) = self.recording.tool_calls.get(cursor.tool) else {
            return Err(ProbeError::ReplayExhausted {
                kind: CallKind::Tool,
                requested: cursor.tool + 1,
                recorded,
            });
        };
        cursor.tool += 1;
        drop(cursor);

        let mut call = call.clone();
        if let Some(mock) = self.tool_mocks.get(&call.tool_name) {
            match mock(&call.tool_input) {
                Ok(output) => call.tool_output = output,
                Err(e) => {
                    call.success = false;
                    call.error = Some(format!("mock error: {e}"));
                    call.tool_output = serde_json::Value::Null;
                }
            }
        }
        tracing::debug!(tool = %call.tool_name, recorded, "replay: served tool call");
        Ok(call)
    }

    /// (model, tool) calls consumed so far.
    pub fn consumed(&self) -> (usize, usize) {
        let cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        (cursor.model, cursor.tool)
    }

    /// Fails unless every recorded call was consumed.
    pub fn ensure_complete(&self) -> Result<()> {
        let (consumed_model, consumed_tool) = self.consumed();
        let recorded_model = self.recording.llm_calls.len();
        let recorded_tool = self.recording.tool_calls.len();
        if consumed_model < recorded_model || consumed_tool < recorded_tool {
            return Err(ProbeError::ReplayIncomplete {
                consumed_model,
                recorded_model,
                consumed_tool,
                recorded_tool,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayDiff {
    pub original_trace_id: String,
    pub replay_trace_id: String,
    pub tool_call_diffs: Vec<DiffItem>,
    pub output_matches: bool,
    pub original_output: String,
    pub replay_output: String,
}

impl ReplayDiff {
    pub fn is_identical(&self) -> bool {
        self.output_matches && self.tool_call_diffs.iter().all(|d| d.similarity >= 1.0)
    }
}

/// Drives one live invocation against a single recording.
#[derive(Clone, Default)]
pub struct ReplayEngine {
    tool_mocks: HashMap<String, ToolMock>,
    output_override: Option<String>,
    strict: bool,
}

impl ReplayEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mock_tool<F>(mut self, tool_name: impl Into<String>, mock: F) -> Self
    where
        F: Fn(&serde_json::Value) -> std::result::Result<serde_json::Value, String>
            + Send
            + Sync
            + 'static,
    {
        self.tool_mocks.insert(tool_name.into(), Arc::new(mock));
        self
    }

    pub fn override_output(mut self, output: impl Into<String>) -> Self {
        self.output_override = Some(output.into());
        self
    }

    /// Fail replays that leave recorded calls unconsumed.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn session(&self, recording: Arc<Trace>) -> Arc<ReplaySession> {
        let mut session = ReplaySession::new(recording);
        session.tool_mocks = self.tool_mocks.clone();
        Arc::new(session)
    }

    pub async fn replay(
        &self,
        adapter: &dyn Adapter,
        recording: Arc<Trace>,
        input: &str,
        opts: InvokeOptions,
    ) -> Result<Trace> {
        let session = self.session(recording);
        let mut trace = adapter
            .invoke(input, opts.with_replay(session.clone()))
            .await?;
        if self.strict {
            session.ensure_complete()?;
        }
        if let Some(output) = &self.output_override {
            trace.output_text = output.clone();
        }
        Ok(trace)
    }

    pub fn diff(&self, original: &Trace, replayed: &Trace) -> ReplayDiff {
        ReplayDiff {
            original_trace_id: original.trace_id.clone(),
            replay_trace_id: replayed.trace_id.clone(),
            tool_call_diffs: tool_call_diffs(&original.tool_calls, &replayed.tool_calls),
            output_matches: original.output_text == replayed.output_text,
            original_output: original.output_text.clone(),
            replay_output: replayed.output_text.clone(),
        }
    }
}

#[derive(Clone)]
enum Recordings {
    Single(Arc<Trace>),
    PerTest(BTreeMap<String, Arc<Trace>>),
}

/// Adapter decorator that serves every invocation from a recording, so the runner
/// can re-run a batch without live calls.
pub struct ReplayAdapter<A> {
    inner: A,
    engine: ReplayEngine,
    recordings: Recordings,
}

impl<A: Adapter> ReplayAdapter<A> {
    pub fn single(inner: A, recording: Trace) -> Self {
        Self {
            inner,
            engine: ReplayEngine::new(),
            recordings: Recordings::Single(Arc::new(recording)),
        }
    }

    /// Recordings keyed by test name; an invocation for an unknown test fails
    /// with [`ProbeError::RecordingNotFound`].
    pub fn library(inner: A, recordings: BTreeMap<String, Trace>) -> Self {
        Self {
            inner,
            engine: ReplayEngine::new(),
            recordings: Recordings::PerTest(
                recordings
                    .into_iter()
                    .map(|(k, v)| (k, Arc::new(v)))
                    .collect(),
            ),
        }
    }

    pub fn with_engine(mut self, engine: ReplayEngine) -> Self {
        self.engine = engine;
        self
    }

    fn recording_for(&self, opts: &InvokeOptions) -> Result<Arc<Trace>> {
        match &self.recordings {
            Recordings::Single(t) => Ok(t.clone()),
            Recordings::PerTest(map) => {
                let test = opts.test_name.clone().unwrap_or_default();
                map.get(&test)
                    .cloned()
                    .ok_or(ProbeError::RecordingNotFound { test })
            }
        }
    }
}

#[async_trait]
impl<A: Adapter> Adapter for ReplayAdapter<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(&self, input: &str, opts: InvokeOptions) -> Result<Trace> {
        let recording = self.recording_for(&opts)?;
        self.engine
            .replay(&self.inner, recording, input, opts)
            .await
    }
}
