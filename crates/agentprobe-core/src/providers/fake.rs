use super::{Adapter, InvokeOptions};
use crate::errors::{ProbeError, Result};
use crate::trace::{LlmCall, ToolCall, Trace, TraceRecorder};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A sub-call the fake performs on every invocation, in order.
#[derive(Debug, Clone)]
pub enum ScriptedCall {
    Model(LlmCall),
    Tool(ToolCall),
}

/// Deterministic adapter for tests.
///
/// Without a fixed reply it answers with the output of its last model call, or
/// `echo: <input>` when it makes none. Delays, failures and panics are keyed by input.
#[derive(Debug)]
pub struct FakeAdapter {
    name: String,
    fixed_reply: Option<String>,
    script: Vec<ScriptedCall>,
    delays: HashMap<String, Duration>,
    failures: HashMap<String, String>,
    panics: HashSet<String>,
    invocations: AtomicUsize,
}

impl FakeAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fixed_reply: None,
            script: Vec::new(),
            delays: HashMap::new(),
            failures: HashMap::new(),
            panics: HashSet::new(),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.fixed_reply = Some(reply.into());
        self
    }

    pub fn with_call(mut self, call: ScriptedCall) -> Self {
        self.script.push(call);
        self
    }

    pub fn delay_on(mut self, input: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(input.into(), delay);
        self
    }

    pub fn fail_on(mut self, input: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(input.into(), message.into());
        self
    }

    pub fn panic_on(mut self, input: impl Into<String>) -> Self {
        self.panics.insert(input.into());
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for FakeAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, input: &str, opts: InvokeOptions) -> Result<Trace> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(input) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(message) = self.failures.get(input) {
            return Err(ProbeError::adapter(&self.name, message.clone()));
        }
        if self.panics.contains(input) {
            panic!("fake adapter panicked on input {input:?}");
        }

        let mut rec = TraceRecorder::new(&self.name)?
            .model("fake")
            .with_options(&opts);
        let mut last_model_output = None;
        for step in &self.script {
            match step {
                ScriptedCall::Model(call) => {
                    let call = call.clone();
                    let served = rec.model_call(|| async move { Ok(call) }).await?;
                    last_model_output = Some(served.output_text);
                }
                ScriptedCall::Tool(call) => {
                    let call = call.clone();
                    rec.tool_call(|| async move { Ok(call) }).await?;
                }
            }
        }

        let output = self
            .fixed_reply
            .clone()
            .or(last_model_output)
            .unwrap_or_else(|| format!("echo: {input}"));
        Ok(rec.finalize(input, output))
    }
}
