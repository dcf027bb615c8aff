//! Trace model: the immutable record of one adapter invocation.

pub mod diff;
pub mod recorder;
pub mod time_travel;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use diff::TraceDiffer;
pub use recorder::TraceRecorder;
pub use time_travel::{TimeTravel, TraceStep};

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_true() -> bool {
    true
}

/// One model (LLM) sub-call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmCall {
    #[serde(default = "new_id")]
    pub call_id: String,
    pub model: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub input_text: String,
    #[serde(default)]
    pub output_text: String,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl LlmCall {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            call_id: new_id(),
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            input_text: String::new(),
            output_text: String::new(),
            latency_ms: 0,
            success: true,
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_text(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.input_text = input.into();
        self.output_text = output.into();
        self
    }

    pub fn with_tokens(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

/// One tool sub-call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default = "new_id")]
    pub call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: serde_json::Value,
    #[serde(default)]
    pub tool_output: serde_json::Value,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, tool_input: serde_json::Value) -> Self {
        Self {
            call_id: new_id(),
            tool_name: tool_name.into(),
            tool_input,
            tool_output: serde_json::Value::Null,
            success: true,
            error: None,
            latency_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_output(mut self, tool_output: serde_json::Value) -> Self {
        self.tool_output = tool_output;
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

/// A step in the conversation: either a model call or a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "call", rename_all = "snake_case")]
pub enum Turn {
    Model(LlmCall),
    Tool(ToolCall),
}

impl Turn {
    pub fn latency_ms(&self) -> u64 {
        match self {
            Turn::Model(c) => c.latency_ms,
            Turn::Tool(c) => c.latency_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default = "new_id")]
    pub trace_id: String,
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub input_text: String,
    #[serde(default)]
    pub output_text: String,
    #[serde(default)]
    pub llm_calls: Vec<LlmCall>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub turns: Vec<Turn>,
    #[serde(default)]
    pub total_input_tokens: u64,
    #[serde(default)]
    pub total_output_tokens: u64,
    #[serde(default)]
    pub total_latency_ms: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Trace {
    /// A trace with no sub-calls. Adapters that do not record calls use this.
    pub fn simple(
        agent_name: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: new_id(),
            agent_name: agent_name.into(),
            model: None,
            input_text: input.into(),
            output_text: output.into(),
            llm_calls: Vec::new(),
            tool_calls: Vec::new(),
            turns: Vec::new(),
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_latency_ms: 0,
            tags: Vec::new(),
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens
            .saturating_add(self.total_output_tokens)
    }

    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.tool_calls.iter().map(|c| c.tool_name.as_str())
    }
}
