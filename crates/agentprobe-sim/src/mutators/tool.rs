use super::Mutator;
use agentprobe_core::{ToolCall, Trace, Turn};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a targeted tool call is made to misbehave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolFaultKind {
    Timeout,
    Error { message: String },
    /// Succeeds with output that is not valid JSON text.
    Malformed,
    RateLimit,
    Slow { delay_ms: u64 },
    /// Succeeds with an empty string.
    Empty,
}

/// Rewrites the recorded result of every tool call named `target_tool`
/// (every tool call when `None`), in both the call list and the turn sequence.
pub struct ToolFault {
    pub target_tool: Option<String>,
    pub fault: ToolFaultKind,
}

impl ToolFault {
    fn targets(&self, call: &ToolCall) -> bool {
        self.target_tool
            .as_deref()
            .map_or(true, |name| name == call.tool_name)
    }

    fn apply(&self, call: &mut ToolCall) {
        let failed = |call: &mut ToolCall, error: String| {
            call.success = false;
            call.error = Some(error);
            call.tool_output = Value::Null;
        };
        match &self.fault {
            ToolFaultKind::Timeout => failed(call, "chaos: operation timed out".into()),
            ToolFaultKind::Error { message } => failed(call, format!("chaos: {message}")),
            ToolFaultKind::RateLimit => failed(call, "chaos: rate limit exceeded (429)".into()),
            ToolFaultKind::Malformed => {
                call.success = true;
                call.tool_output = Value::String("{malformed: data, <<invalid>>}".into());
            }
            ToolFaultKind::Empty => {
                call.success = true;
                call.tool_output = Value::String(String::new());
            }
            ToolFaultKind::Slow { delay_ms } => {
                call.latency_ms = call.latency_ms.saturating_add(*delay_ms);
            }
        }
    }
}

impl Mutator for ToolFault {
    fn mutate(&self, trace: &Trace) -> Result<Trace> {
        let mut faulted = trace.clone();
        for call in faulted.tool_calls.iter_mut().filter(|c| self.targets(c)) {
            self.apply(call);
        }
        for turn in &mut faulted.turns {
            if let Turn::Tool(call) = turn {
                if self.targets(call) {
                    self.apply(call);
                }
            }
        }
        Ok(faulted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_tools() -> Trace {
        let mut trace = Trace::simple("a", "q", "out");
        for name in ["search", "calc"] {
            let call = ToolCall::new(name, json!({})).with_output(json!({"ok": true}));
            trace.tool_calls.push(call.clone());
            trace.turns.push(Turn::Tool(call));
        }
        trace
    }

    #[test]
    fn only_targeted_tool_is_touched() {
        let fault = ToolFault {
            target_tool: Some("search".into()),
            fault: ToolFaultKind::RateLimit,
        };
        let out = fault.mutate(&with_tools()).unwrap();
        assert!(!out.tool_calls[0].success);
        assert_eq!(
            out.tool_calls[0].error.as_deref(),
            Some("chaos: rate limit exceeded (429)")
        );
        assert_eq!(out.tool_calls[1].tool_output, json!({"ok": true}));
        let Turn::Tool(turn) = &out.turns[0] else {
            panic!("expected tool turn");
        };
        assert_eq!(turn, &out.tool_calls[0]);
    }

    #[test]
    fn untargeted_fault_hits_every_tool() {
        let fault = ToolFault {
            target_tool: None,
            fault: ToolFaultKind::Empty,
        };
        let out = fault.mutate(&with_tools()).unwrap();
        assert!(out.tool_calls.iter().all(|c| c.tool_output == json!("")));
    }

    #[test]
    fn slow_keeps_output_and_adds_latency() {
        let fault = ToolFault {
            target_tool: Some("calc".into()),
            fault: ToolFaultKind::Slow { delay_ms: 500 },
        };
        let out = fault.mutate(&with_tools()).unwrap();
        assert_eq!(out.tool_calls[1].latency_ms, 500);
        assert_eq!(out.tool_calls[1].tool_output, json!({"ok": true}));
        assert!(out.tool_calls[1].success);
    }
}
