pub mod core;
pub mod handlers;

pub use core::RoutingServer;
pub use handlers::{GameServerChannel, PlayerChannel};
