//! Tool-server subprocess layer: wire protocol, managed connections, and the
//! per-run broker that owns them.

pub mod broker;
pub mod connection;
pub mod protocol;

pub use broker::ToolBroker;
pub use connection::{ConnectionState, ToolConnection};
pub use protocol::{ToolCall, ToolResult, ToolStatus};
