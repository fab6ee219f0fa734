//! WebSocket delivery of live job updates.

mod handler;

pub use handler::live_ws_handler;
