//! Protocol dispatcher — routes decoded envelopes into application state.
//!
//! All effects are observable through the chat transcript, the canvas (via
//! tool handlers), or `tool_result` commands written back to the sink. The
//! supervisor invokes `handle` from a single task, so envelope processing is
//! strictly sequential in receipt order.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::tools::{ToolOutcome, ToolRegistry};
use crate::error::BridgeError;
use crate::protocol::{Command, ContentBlock, Envelope};
use crate::transcript::{ChatTranscript, Role};

/// Outbound half of the wire — how the dispatcher sends commands back to
/// the child. The supervisor implements this over the child's stdin; tests
/// substitute a channel.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, command: &Command) -> Result<(), BridgeError>;
}

/// Interprets decoded envelopes by type and routes tool invocations to
/// registered handlers.
pub struct Dispatcher {
    transcript: Arc<ChatTranscript>,
    tools: ToolRegistry,
    sink: Arc<dyn CommandSink>,
}

impl Dispatcher {
    pub fn new(
        transcript: Arc<ChatTranscript>,
        tools: ToolRegistry,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            transcript,
            tools,
            sink,
        }
    }

    /// Handle one decoded envelope.
    pub async fn handle(&self, envelope: Envelope) {
        match envelope {
            Envelope::Message {
                message_type,
                content,
            } => {
                // Only assistant messages reach the transcript. The wrapper
                // also streams SystemMessage/ResultMessage sub-kinds, which
                // are noise for the user.
                if message_type != "AssistantMessage" {
                    debug!(kind = %message_type, "suppressed non-assistant message");
                    return;
                }
                let text = content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("");
                if !text.is_empty() {
                    self.transcript.append(Role::Assistant, text).await;
                }
            }

            Envelope::Response { command, success } => {
                debug!(command = %command, success, "wrapper acknowledged command");
            }

            Envelope::Error { error } => {
                let message = error.unwrap_or_else(|| "Unknown error".to_string());
                self.transcript
                    .append(Role::System, format!("Error: {message}"))
                    .await;
            }

            Envelope::ToolInvocation {
                tool_use_id,
                name,
                input,
            } => {
                self.handle_tool_invocation(tool_use_id, name, input).await;
            }

            Envelope::Unknown => {
                warn!("unrecognized envelope type — dropped");
            }
        }
    }

    async fn handle_tool_invocation(
        &self,
        tool_use_id: Option<String>,
        name: Option<String>,
        input: Option<Value>,
    ) {
        // Without a call id there is nothing to key a reply on.
        let Some(id) = tool_use_id else {
            warn!("tool invocation without tool_use_id — dropped");
            return;
        };

        // A malformed invocation still gets an error reply, otherwise the
        // child waits on this call id forever.
        let (Some(name), Some(input)) = (name, input) else {
            warn!(tool_use_id = %id, "malformed tool invocation");
            self.reply(&id, ToolOutcome::error("Malformed tool invocation"))
                .await;
            return;
        };

        let outcome = match self.tools.get(&name) {
            Some(handler) => handler.invoke(&input).await,
            None => ToolOutcome::error(format!("Unknown tool: {name}")),
        };
        debug!(tool = %name, is_error = outcome.is_error, "tool invocation complete");
        self.reply(&id, outcome).await;
    }

    /// Send exactly one `tool_result` for an invocation, success or failure.
    async fn reply(&self, tool_use_id: &str, outcome: ToolOutcome) {
        let command = Command::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content: outcome.content,
            is_error: outcome.is_error,
        };
        if let Err(e) = self.sink.send(&command).await {
            warn!(error = %e, "failed to send tool_result");
            self.transcript
                .append(Role::System, format!("Error: failed to send tool result: {e}"))
                .await;
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tools::DrawPixelTool;
    use crate::canvas::{CanvasGrid, Color};
    use crate::event::EventBroadcaster;
    use crate::protocol::decode_envelope;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct ChannelSink {
        tx: mpsc::UnboundedSender<Command>,
    }

    #[async_trait]
    impl CommandSink for ChannelSink {
        async fn send(&self, command: &Command) -> Result<(), BridgeError> {
            self.tx
                .send(command.clone())
                .map_err(|_| BridgeError::NotConnected)
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        transcript: Arc<ChatTranscript>,
        canvas: Arc<CanvasGrid>,
        rx: mpsc::UnboundedReceiver<Command>,
    }

    fn fixture() -> Fixture {
        let events = Arc::new(EventBroadcaster::new());
        let transcript = Arc::new(ChatTranscript::new(events.clone()));
        let canvas = Arc::new(CanvasGrid::new(events));
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(DrawPixelTool::new(canvas.clone())));
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(transcript.clone(), tools, Arc::new(ChannelSink { tx }));
        Fixture {
            dispatcher,
            transcript,
            canvas,
            rx,
        }
    }

    fn envelope(raw: &str) -> Envelope {
        decode_envelope(raw).unwrap()
    }

    #[tokio::test]
    async fn assistant_message_concatenates_text_blocks() {
        let mut f = fixture();
        f.dispatcher
            .handle(envelope(
                r#"{"type":"message","message_type":"AssistantMessage","content":[{"type":"text","text":"Hello "},{"type":"tool_use","id":"i"},{"type":"text","text":"world"}]}"#,
            ))
            .await;

        let entries = f.transcript.snapshot().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].role, Role::Assistant);
        assert_eq!(entries[0].text, "Hello world");
        assert!(f.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn non_assistant_and_empty_messages_are_suppressed() {
        let mut f = fixture();
        f.dispatcher
            .handle(envelope(
                r#"{"type":"message","message_type":"SystemMessage","content":[{"type":"text","text":"boot"}]}"#,
            ))
            .await;
        f.dispatcher
            .handle(envelope(
                r#"{"type":"message","message_type":"AssistantMessage","content":[{"type":"tool_use","id":"i"}]}"#,
            ))
            .await;
        assert!(f.transcript.is_empty().await);
        assert!(f.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn response_envelopes_never_touch_the_transcript() {
        let f = fixture();
        f.dispatcher
            .handle(envelope(
                r#"{"type":"response","command":"query","success":true}"#,
            ))
            .await;
        assert!(f.transcript.is_empty().await);
    }

    #[tokio::test]
    async fn error_envelopes_become_system_entries() {
        let f = fixture();
        f.dispatcher
            .handle(envelope(r#"{"type":"error","error":"wrapper exploded"}"#))
            .await;
        f.dispatcher.handle(envelope(r#"{"type":"error"}"#)).await;

        let entries = f.transcript.snapshot().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, Role::System);
        assert_eq!(entries[0].text, "Error: wrapper exploded");
        assert_eq!(entries[1].text, "Error: Unknown error");
    }

    #[tokio::test]
    async fn draw_pixel_invocation_mutates_grid_and_replies() {
        let mut f = fixture();
        f.dispatcher
            .handle(envelope(
                r##"{"type":"tool_invocation","tool_use_id":"call-1","name":"draw_pixel","input":{"x":10,"y":10,"color":"#00FF00"}}"##,
            ))
            .await;

        assert_eq!(f.canvas.get(10, 10).await, Color::new(0, 255, 0));
        match f.rx.try_recv().unwrap() {
            Command::ToolResult {
                tool_use_id,
                is_error,
                ..
            } => {
                assert_eq!(tool_use_id, "call-1");
                assert!(!is_error);
            }
            other => panic!("expected ToolResult, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_parameters_reply_with_error_and_leave_grid_alone() {
        let mut f = fixture();
        f.dispatcher
            .handle(envelope(
                r#"{"type":"tool_invocation","tool_use_id":"call-2","name":"draw_pixel","input":{"x":"not a number","y":10,"color":"red"}}"#,
            ))
            .await;

        assert!(f.canvas.snapshot().await.iter().all(|&c| c == Color::WHITE));
        match f.rx.try_recv().unwrap() {
            Command::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                assert_eq!(tool_use_id, "call-2");
                assert!(is_error);
                assert_eq!(content, "Invalid parameters for draw_pixel");
            }
            other => panic!("expected ToolResult, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_replies_with_error() {
        let mut f = fixture();
        f.dispatcher
            .handle(envelope(
                r#"{"type":"tool_invocation","tool_use_id":"call-3","name":"erase_pixel","input":{}}"#,
            ))
            .await;

        match f.rx.try_recv().unwrap() {
            Command::ToolResult {
                content, is_error, ..
            } => {
                assert!(is_error);
                assert_eq!(content, "Unknown tool: erase_pixel");
            }
            other => panic!("expected ToolResult, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invocation_without_call_id_is_dropped() {
        let mut f = fixture();
        f.dispatcher
            .handle(envelope(
                r#"{"type":"tool_invocation","name":"draw_pixel","input":{"x":1,"y":1,"color":"red"}}"#,
            ))
            .await;
        assert!(f.rx.try_recv().is_err());
        assert!(f.transcript.is_empty().await);
    }

    #[tokio::test]
    async fn invocation_with_id_but_missing_fields_gets_error_reply() {
        let mut f = fixture();
        f.dispatcher
            .handle(envelope(r#"{"type":"tool_invocation","tool_use_id":"call-4"}"#))
            .await;

        match f.rx.try_recv().unwrap() {
            Command::ToolResult {
                tool_use_id,
                is_error,
                ..
            } => {
                assert_eq!(tool_use_id, "call-4");
                assert!(is_error);
            }
            other => panic!("expected ToolResult, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_envelope_is_inert() {
        let f = fixture();
        f.dispatcher
            .handle(envelope(r#"{"type":"telemetry","data":1}"#))
            .await;
        assert!(f.transcript.is_empty().await);
    }

    #[tokio::test]
    async fn nested_input_values_reach_the_handler() {
        // The dynamically-typed input tree decodes recursively; extra nested
        // structure is ignored by draw_pixel's accessors, not a decode error.
        let mut f = fixture();
        f.dispatcher
            .handle(envelope(
                r#"{"type":"tool_invocation","tool_use_id":"call-5","name":"draw_pixel","input":{"x":1,"y":1,"color":"cyan","meta":{"depth":[1,2,{"deep":true}]}}}"#,
            ))
            .await;
        assert_eq!(f.canvas.get(1, 1).await, Color::new(0, 255, 255));
        assert!(matches!(
            f.rx.try_recv().unwrap(),
            Command::ToolResult { is_error: false, .. }
        ));
    }
}
