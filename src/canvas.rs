//! Canvas state store — a 128×128 grid of RGB pixels.
//!
//! Mutated only by the `draw_pixel` tool handler; read by frontends.
//! Out-of-bounds writes are silently ignored (clamp-by-ignore), out-of-bounds
//! reads return the default white.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::event::{BridgeEvent, EventBroadcaster};

/// Canvas width and height in pixels.
pub const CANVAS_SIZE: usize = 128;

// ─── Color ────────────────────────────────────────────────────────────────────

/// One RGB pixel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Uppercase `#RRGGBB` form, for tool results and logs.
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Named colors the assistant may use instead of hex strings.
const COLOR_NAMES: &[(&str, Color)] = &[
    ("red", Color::new(255, 0, 0)),
    ("green", Color::new(0, 255, 0)),
    ("blue", Color::new(0, 0, 255)),
    ("yellow", Color::new(255, 255, 0)),
    ("orange", Color::new(255, 165, 0)),
    ("purple", Color::new(128, 0, 128)),
    ("pink", Color::new(255, 192, 203)),
    ("brown", Color::new(165, 42, 42)),
    ("black", Color::new(0, 0, 0)),
    ("white", Color::new(255, 255, 255)),
    ("gray", Color::new(128, 128, 128)),
    ("grey", Color::new(128, 128, 128)),
    ("cyan", Color::new(0, 255, 255)),
    ("magenta", Color::new(255, 0, 255)),
];

/// Resolve a color string: a known name (case-insensitive, whitespace
/// tolerated) or a 6-hex-digit RGB value with optional leading `#`.
/// Anything else returns `None`.
pub fn parse_color(input: &str) -> Option<Color> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();
    if let Some((_, color)) = COLOR_NAMES.iter().find(|(name, _)| *name == lower) {
        return Some(*color);
    }

    let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Color::new(r, g, b))
}

// ─── CanvasGrid ───────────────────────────────────────────────────────────────

/// The shared pixel grid. Row-major, origin top-left, all white initially.
pub struct CanvasGrid {
    pixels: RwLock<Vec<Color>>,
    events: Arc<EventBroadcaster>,
}

impl CanvasGrid {
    pub fn new(events: Arc<EventBroadcaster>) -> Self {
        Self {
            pixels: RwLock::new(vec![Color::WHITE; CANVAS_SIZE * CANVAS_SIZE]),
            events,
        }
    }

    /// Write one pixel and notify subscribers.
    ///
    /// Coordinates outside `[0, 128)` (including negatives) are a silent
    /// no-op — the assistant occasionally draws off the edge and the contract
    /// is to ignore it rather than error.
    pub async fn set(&self, x: i64, y: i64, color: Color) {
        let (Some(col), Some(row)) = (in_bounds(x), in_bounds(y)) else {
            return;
        };
        self.pixels.write().await[row * CANVAS_SIZE + col] = color;
        self.events.broadcast(BridgeEvent::PixelDrawn {
            x: col,
            y: row,
            color,
        });
    }

    /// Read one pixel. Out-of-bounds coordinates read as white.
    pub async fn get(&self, x: i64, y: i64) -> Color {
        let (Some(col), Some(row)) = (in_bounds(x), in_bounds(y)) else {
            return Color::WHITE;
        };
        self.pixels.read().await[row * CANVAS_SIZE + col]
    }

    /// Copy of the full grid, row-major, for rendering.
    pub async fn snapshot(&self) -> Vec<Color> {
        self.pixels.read().await.clone()
    }
}

fn in_bounds(v: i64) -> Option<usize> {
    (0..CANVAS_SIZE as i64).contains(&v).then_some(v as usize)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> CanvasGrid {
        CanvasGrid::new(Arc::new(EventBroadcaster::new()))
    }

    #[tokio::test]
    async fn set_then_get_round_trips_everywhere() {
        let canvas = grid();
        for y in 0..CANVAS_SIZE as i64 {
            for x in 0..CANVAS_SIZE as i64 {
                let color = Color::new(x as u8, y as u8, (x ^ y) as u8);
                canvas.set(x, y, color).await;
                assert_eq!(canvas.get(x, y).await, color, "at ({x}, {y})");
            }
        }
    }

    #[tokio::test]
    async fn out_of_bounds_set_is_a_noop() {
        let canvas = grid();
        for &(x, y) in &[(-1, 0), (0, -1), (128, 0), (0, 128), (1000, 1000)] {
            canvas.set(x, y, Color::new(1, 2, 3)).await;
        }
        // Nothing in bounds changed.
        assert!(canvas.snapshot().await.iter().all(|&c| c == Color::WHITE));
    }

    #[tokio::test]
    async fn out_of_bounds_get_reads_white() {
        let canvas = grid();
        assert_eq!(canvas.get(-1, 5).await, Color::WHITE);
        assert_eq!(canvas.get(128, 5).await, Color::WHITE);
    }

    #[tokio::test]
    async fn set_broadcasts_pixel_drawn() {
        let events = Arc::new(EventBroadcaster::new());
        let canvas = CanvasGrid::new(events.clone());
        let mut rx = events.subscribe();

        canvas.set(3, 4, Color::new(9, 9, 9)).await;
        match rx.try_recv() {
            Ok(BridgeEvent::PixelDrawn { x, y, color }) => {
                assert_eq!((x, y), (3, 4));
                assert_eq!(color, Color::new(9, 9, 9));
            }
            other => panic!("expected PixelDrawn, got {other:?}"),
        }
    }

    #[test]
    fn parse_color_names_ignore_case_and_whitespace() {
        let red = Color::new(255, 0, 0);
        assert_eq!(parse_color("red"), Some(red));
        assert_eq!(parse_color("RED"), Some(red));
        assert_eq!(parse_color("  red  "), Some(red));
        assert_eq!(parse_color("grey"), parse_color("gray"));
    }

    #[test]
    fn parse_color_hex_with_and_without_hash() {
        let red = Color::new(255, 0, 0);
        assert_eq!(parse_color("#ff0000"), Some(red));
        assert_eq!(parse_color("ff0000"), Some(red));
        assert_eq!(parse_color("#FF0000"), Some(red));
        assert_eq!(parse_color("00ff00"), Some(Color::new(0, 255, 0)));
    }

    #[test]
    fn parse_color_rejects_garbage() {
        assert_eq!(parse_color("xyz"), None);
        assert_eq!(parse_color("1234567"), None);
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_color(""), None);
        assert_eq!(parse_color("#gg0000"), None);
    }
}
