//! Connection management for both WebSocket channels.

pub mod manager;

pub use manager::ConnectionManager;

use async_trait::async_trait;
use fleet_registry::ConnectionId;

/// Per-channel behaviour plugged into [`ConnectionManager::serve`].
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    /// Short channel name used in logs.
    fn name(&self) -> &'static str;

    /// Handles one inbound text frame. Must not fail: errors are dealt with here.
    async fn on_message(&self, connection: ConnectionId, text: &str);

    /// Called once after the connection's read loop has ended.
    async fn on_close(&self, connection: ConnectionId);
}
