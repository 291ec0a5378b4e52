//! The subprocess message-passing bridge: supervisor, dispatcher, and tools.

pub mod dispatcher;
pub mod supervisor;
pub mod tools;

pub use dispatcher::{CommandSink, Dispatcher};
pub use supervisor::{BridgeState, WrapperSupervisor};
pub use tools::{DrawPixelTool, ToolHandler, ToolOutcome, ToolRegistry};
