use crate::trace::Trace;
use sha2::{Digest, Sha256};

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Content digest of a trace's behaviour: output text, the ordered call sequence
/// and the token totals. Identifiers, timestamps and latency are excluded so two
/// runs that behave the same fingerprint the same.
pub fn trace_fingerprint(trace: &Trace) -> String {
    let mut parts = Vec::with_capacity(4 + trace.llm_calls.len() + trace.tool_calls.len());

    parts.push(format!("output={}", trace.output_text));
    for call in &trace.llm_calls {
        parts.push(format!(
            "model={}|in={}|out={}",
            call.model, call.input_tokens, call.output_tokens
        ));
    }
    for call in &trace.tool_calls {
        // serde_json::Value maps serialize with sorted keys, so this is canonical.
        parts.push(format!(
            "tool={}|input={}|output={}",
            call.tool_name, call.tool_input, call.tool_output
        ));
    }
    parts.push(format!("input_tokens={}", trace.total_input_tokens));
    parts.push(format!("output_tokens={}", trace.total_output_tokens));

    sha256_hex(&parts.join("\n"))
}
