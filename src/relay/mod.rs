//! Relay core: per-connection turn lifecycle.
//!
//! Inbound frames are parsed into chat requests, at most one turn runs per
//! connection, and every turn ends with exactly one terminal event.

mod controller;
pub mod events;
pub mod session;

pub(crate) use controller::emit;
pub use controller::{EventSink, RelayController};
pub use events::{parse_frame, InboundEvent, OutboundEvent, UserMessage};
pub use session::{ConnectionId, RelaySession, SessionRegistry, SessionStatus};
