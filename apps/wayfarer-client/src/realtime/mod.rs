//! Realtime chat over a STOMP broker: one shared WebSocket connection with
//! per-room subscriptions layered on top.

mod connection;
pub mod diagnostics;
pub mod frame;
pub mod heartbeat;
pub mod manager;
pub mod message;
pub mod registry;
pub mod teardown;

pub use diagnostics::ChannelDiagnostic;
pub use manager::{ChannelManager, ChannelState, RoomSubscription};
pub use message::ChatMessage;
pub use teardown::disconnect_on_sign_out;
