//! HTTP and WebSocket surface.
//!
//! `/api/socket` carries the streaming relay; `/api/chat` answers the same
//! request in one response.

mod handlers;
mod server;
mod socket;

pub use handlers::ChatBody;
pub use server::{create_router, run_server, AppState};
