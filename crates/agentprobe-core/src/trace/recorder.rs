//! Builds a [`Trace`] while an adapter runs, routing sub-calls through a replay
//! session when one is installed.

use super::{LlmCall, ToolCall, Trace, Turn};
use crate::errors::{ProbeError, Result};
use crate::providers::InvokeOptions;
use crate::replay::ReplaySession;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub struct TraceRecorder {
    agent_name: String,
    model: Option<String>,
    tags: Vec<String>,
    replay: Option<Arc<ReplaySession>>,
    llm_calls: Vec<LlmCall>,
    tool_calls: Vec<ToolCall>,
    turns: Vec<Turn>,
    metadata: BTreeMap<String, serde_json::Value>,
    started: Instant,
}

impl TraceRecorder {
    pub fn new(agent_name: impl Into<String>) -> Result<Self> {
        let agent_name = agent_name.into();
        if agent_name.trim().is_empty() {
            return Err(ProbeError::config("trace recorder needs a non-empty agent name"));
        }
        Ok(Self {
            agent_name,
            model: None,
            tags: Vec::new(),
            replay: None,
            llm_calls: Vec::new(),
            tool_calls: Vec::new(),
            turns: Vec::new(),
            metadata: BTreeMap::new(),
            started: Instant::now(),
        })
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Picks up the replay session (if any) from the invocation options.
    pub fn with_options(mut self, opts: &InvokeOptions) -> Self {
        self.replay = opts.replay.clone();
        if let Some(name) = &opts.test_name {
            self.metadata
                .insert("test_name".into(), serde_json::Value::String(name.clone()));
        }
        self
    }

    pub fn is_replaying(&self) -> bool {
        self.replay.is_some()
    }

    pub fn record_model_call(&mut self, call: LlmCall) {
        self.llm_calls.push(call.clone());
        self.turns.push(Turn::Model(call));
    }

    pub fn record_tool_call(&mut self, call: ToolCall) {
        self.tool_calls.push(call.clone());
        self.turns.push(Turn::Tool(call));
    }

    /// Runs a model sub-call. Under replay the next recorded model call is returned
    /// and `live` is never polled.
    pub async fn model_call<F, Fut>(&mut self, live: F) -> Result<LlmCall>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<LlmCall>>,
    {
        let call = match &self.replay {
            Some(session) => session.next_model()?,
            None => {
                let started = Instant::now();
                let mut call = live().await?;
                if call.latency_ms == 0 {
                    call.latency_ms = crate::model::millis(started.elapsed());
                }
                call
            }
        };
        self.record_model_call(call.clone());
        Ok(call)
    }

    /// Tool counterpart of [`TraceRecorder::model_call`].
    pub async fn tool_call<F, Fut>(&mut self, live: F) -> Result<ToolCall>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ToolCall>>,
    {
        let call = match &self.replay {
            Some(session) => session.next_tool()?,
            None => {
                let started = Instant::now();
                let mut call = live().await?;
                if call.latency_ms == 0 {
                    call.latency_ms = crate::model::millis(started.elapsed());
                }
                call
            }
        };
        self.record_tool_call(call.clone());
        Ok(call)
    }

    pub fn finalize(self, input: impl Into<String>, output: impl Into<String>) -> Trace {
        let total_input_tokens = saturating_total(self.llm_calls.iter().map(|c| c.input_tokens));
        let total_output_tokens =
            saturating_total(self.llm_calls.iter().map(|c| c.output_tokens));
        let sub_call_latency = saturating_total(self.turns.iter().map(Turn::latency_ms));
        let elapsed = crate::model::millis(self.started.elapsed());

        let mut metadata = self.metadata;
        if self.replay.is_some() {
            metadata.insert("replayed".into(), serde_json::Value::Bool(true));
        }

        let mut trace = Trace::simple(self.agent_name, input, output);
        trace.model = self.model;
        trace.llm_calls = self.llm_calls;
        trace.tool_calls = self.tool_calls;
        trace.turns = self.turns;
        trace.total_input_tokens = total_input_tokens;
        trace.total_output_tokens = total_output_tokens;
        trace.total_latency_ms = elapsed.max(sub_call_latency);
        trace.tags = self.tags;
        trace.metadata = metadata;
        trace
    }
}

fn saturating_total(values: impl Iterator<Item = u64>) -> u64 {
    values.fold(0, u64::saturating_add)
}
