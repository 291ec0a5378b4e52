//! Tool handlers the assistant can invoke through the wire protocol.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::canvas::{parse_color, CanvasGrid};
use crate::protocol::ToolDef;

/// Outcome of one tool invocation, reported back as a `tool_result` command.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A capability the assistant can invoke by name.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Schema declared to the wrapper at `create_client` time.
    fn definition(&self) -> ToolDef;

    /// Execute the tool. Bad input must come back as an error outcome,
    /// never a panic — the dispatcher turns every outcome into exactly one
    /// `tool_result`.
    async fn invoke(&self, input: &Value) -> ToolOutcome;
}

/// Registry of tool handlers keyed by tool name.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers
            .insert(handler.definition().name, handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Definitions of every registered tool, for the handshake.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.handlers.values().map(|h| h.definition()).collect()
    }
}

// ─── draw_pixel ───────────────────────────────────────────────────────────────

/// The built-in canvas tool: writes one pixel.
pub struct DrawPixelTool {
    canvas: Arc<CanvasGrid>,
}

impl DrawPixelTool {
    pub fn new(canvas: Arc<CanvasGrid>) -> Self {
        Self { canvas }
    }
}

#[async_trait]
impl ToolHandler for DrawPixelTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            name: "draw_pixel".into(),
            description: "Draw a single pixel on the 128x128 canvas".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "x": {"type": "integer", "minimum": 0, "maximum": 127},
                    "y": {"type": "integer", "minimum": 0, "maximum": 127},
                    "color": {
                        "type": "string",
                        "description": "Hex color like #FF0000, or a name like red"
                    }
                },
                "required": ["x", "y", "color"]
            }),
        }
    }

    async fn invoke(&self, input: &Value) -> ToolOutcome {
        // Explicit coercions: an integer x/y and a string color, nothing
        // looser. A float or a numeric string is a parameter error.
        let (x, y, color_str) = match (
            input.get("x").and_then(Value::as_i64),
            input.get("y").and_then(Value::as_i64),
            input.get("color").and_then(Value::as_str),
        ) {
            (Some(x), Some(y), Some(color)) => (x, y, color),
            _ => return ToolOutcome::error("Invalid parameters for draw_pixel"),
        };

        let Some(color) = parse_color(color_str) else {
            return ToolOutcome::error(format!(
                "Invalid color format: {color_str}. Use hex format like #FF0000"
            ));
        };

        // Out-of-bounds coordinates no-op inside the grid by contract.
        self.canvas.set(x, y, color).await;
        ToolOutcome::success(format!("Drew {} pixel at ({x}, {y})", color.to_hex()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Color;
    use crate::event::EventBroadcaster;

    fn tool() -> (DrawPixelTool, Arc<CanvasGrid>) {
        let canvas = Arc::new(CanvasGrid::new(Arc::new(EventBroadcaster::new())));
        (DrawPixelTool::new(canvas.clone()), canvas)
    }

    #[tokio::test]
    async fn draws_a_valid_pixel() {
        let (tool, canvas) = tool();
        let outcome = tool
            .invoke(&json!({"x": 10, "y": 10, "color": "#00FF00"}))
            .await;
        assert!(!outcome.is_error);
        assert!(outcome.content.contains("(10, 10)"));
        assert_eq!(canvas.get(10, 10).await, Color::new(0, 255, 0));
    }

    #[tokio::test]
    async fn named_colors_work() {
        let (tool, canvas) = tool();
        let outcome = tool.invoke(&json!({"x": 1, "y": 2, "color": "RED"})).await;
        assert!(!outcome.is_error);
        assert_eq!(canvas.get(1, 2).await, Color::new(255, 0, 0));
    }

    #[tokio::test]
    async fn mistyped_parameters_are_an_error() {
        let (tool, canvas) = tool();
        for input in [
            json!({"x": "not a number", "y": 10, "color": "red"}),
            json!({"x": 1.5, "y": 10, "color": "red"}),
            json!({"y": 10, "color": "red"}),
            json!({}),
        ] {
            let outcome = tool.invoke(&input).await;
            assert!(outcome.is_error);
            assert_eq!(outcome.content, "Invalid parameters for draw_pixel");
        }
        assert!(canvas.snapshot().await.iter().all(|&c| c == Color::WHITE));
    }

    #[tokio::test]
    async fn bad_color_is_an_error() {
        let (tool, _canvas) = tool();
        let outcome = tool.invoke(&json!({"x": 0, "y": 0, "color": "xyz"})).await;
        assert!(outcome.is_error);
        assert_eq!(
            outcome.content,
            "Invalid color format: xyz. Use hex format like #FF0000"
        );
    }

    #[tokio::test]
    async fn out_of_bounds_draw_still_succeeds() {
        let (tool, canvas) = tool();
        let outcome = tool
            .invoke(&json!({"x": 500, "y": -3, "color": "blue"}))
            .await;
        assert!(!outcome.is_error);
        assert!(canvas.snapshot().await.iter().all(|&c| c == Color::WHITE));
    }

    #[test]
    fn registry_lookups() {
        let (tool, _canvas) = tool();
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(tool));
        assert!(registry.get("draw_pixel").is_some());
        assert!(registry.get("erase_pixel").is_none());
        assert_eq!(registry.definitions().len(), 1);
    }
}
