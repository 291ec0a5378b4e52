use tokio::sync::broadcast;

use crate::canvas::Color;
use crate::transcript::ChatEntry;

/// State-change notifications emitted by the bridge.
///
/// Frontends subscribe to render the transcript and canvas; the bridge never
/// talks to a rendering layer directly.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A chat entry was appended to the transcript.
    EntryAppended(ChatEntry),
    /// A pixel was written to the canvas.
    PixelDrawn { x: usize, y: usize, color: Color },
    /// The wrapper connection came up or went down.
    ConnectionChanged { connected: bool },
}

/// Broadcasts bridge events to all subscribed frontends.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<BridgeEvent>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Send an event to all subscribers. No subscribers is fine.
    pub fn broadcast(&self, event: BridgeEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to all bridge events.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }
}
