pub mod bridge;
pub mod canvas;
pub mod config;
pub mod error;
pub mod event;
pub mod protocol;
pub mod transcript;

pub use bridge::{BridgeState, WrapperSupervisor};
pub use canvas::{CanvasGrid, Color};
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use event::{BridgeEvent, EventBroadcaster};
pub use transcript::{ChatEntry, ChatTranscript, Role};

use std::sync::Arc;

/// Shared application state handed to the frontend.
pub struct AppContext {
    pub config: BridgeConfig,
    pub events: Arc<EventBroadcaster>,
    pub transcript: Arc<ChatTranscript>,
    pub canvas: Arc<CanvasGrid>,
    pub supervisor: Arc<WrapperSupervisor>,
}

impl AppContext {
    /// Wire up the state stores and the supervisor around one config.
    pub fn new(config: BridgeConfig) -> Self {
        let events = Arc::new(EventBroadcaster::new());
        let transcript = Arc::new(ChatTranscript::new(events.clone()));
        let canvas = Arc::new(CanvasGrid::new(events.clone()));
        let supervisor = Arc::new(WrapperSupervisor::new(
            config.clone(),
            transcript.clone(),
            canvas.clone(),
            events.clone(),
        ));
        Self {
            config,
            events,
            transcript,
            canvas,
            supervisor,
        }
    }
}
