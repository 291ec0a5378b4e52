//! Wire protocol for the wrapper subprocess.
//!
//! Both directions carry one JSON object per line. Host→child messages are
//! [`Command`]s discriminated by `command`; child→host messages are
//! [`Envelope`]s discriminated by `type`. Unknown envelope types decode to
//! [`Envelope::Unknown`] instead of failing so a newer wrapper cannot crash
//! the read loop.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Outbound commands ────────────────────────────────────────────────────────

/// Schema for one tool, declared to the wrapper in `create_client`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameter object.
    pub input_schema: Value,
}

/// One host→child protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Handshake: create the assistant client and declare our tools.
    CreateClient { tools: Vec<ToolDef> },
    /// Send a user prompt.
    Query { prompt: String },
    /// Outcome of a tool invocation, keyed by the originating call id.
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
    /// Interrupt the in-flight turn.
    Interrupt,
    /// Graceful shutdown request.
    Disconnect,
}

// ─── Inbound envelopes ────────────────────────────────────────────────────────

/// One decoded child→host protocol message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// A streamed message. Only the `AssistantMessage` sub-kind reaches the
    /// transcript; system/result sub-kinds are suppressed.
    Message {
        message_type: String,
        #[serde(default)]
        content: Vec<ContentBlock>,
    },
    /// Acknowledgement of one of our commands.
    Response { command: String, success: bool },
    /// Wrapper-level error, surfaced to the user.
    Error {
        #[serde(default)]
        error: Option<String>,
    },
    /// The assistant wants us to execute a tool and report back.
    ///
    /// Fields are individually optional so a malformed invocation still
    /// decodes — the dispatcher validates and answers with an error result
    /// rather than letting the line die as a decode failure.
    ToolInvocation {
        #[serde(default)]
        tool_use_id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Option<Value>,
    },
    #[serde(other)]
    Unknown,
}

/// One block of message content. Non-text blocks are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

// ─── Framing ──────────────────────────────────────────────────────────────────

/// Serialize one outbound command to its wire form: JSON plus a single `\n`.
pub fn encode_command(command: &Command) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(command)?;
    line.push('\n');
    Ok(line)
}

/// Decode one line of wrapper output into an envelope.
pub fn decode_envelope(line: &str) -> Result<Envelope, serde_json::Error> {
    serde_json::from_str(line.trim())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
