//! The seam between the match session and the relay channel.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                         Client                             │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐  │
//! │  │   Frontend   │───►│ MatchSession │───►│ RelayClient  │──┼──► Relay server ──► Opponent
//! │  │ (Rendering)  │◄───│ (Game logic) │◄───│ (Transport)  │◄─┼───
//! │  └──────────────┘    └──────────────┘    └──────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The session owns its [`RelayClient`] handle, so tests can hand in an in-memory double
//! instead of [`crate::web_socket_interface::WebSocketRelay`].

use crate::error::RelayError;
use protocol::{ClientMessage, RelayMessage, Sequenced};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Marker trait for types that can be serialized with postcard.
///
/// This combines [`Serialize`] and [`DeserializeOwned`] into a single bound.
pub trait SerializationCap: Serialize + DeserializeOwned {}
impl<T> SerializationCap for T where T: Serialize + DeserializeOwned {}

/// What the transport observed since the last poll.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// The connection is usable.
    Opened,
    /// A push or reply from the relay.
    Message(Sequenced<RelayMessage>),
    /// The connection is gone for good, with the reason.
    Closed(String),
}

/// A bidirectional, message tagged channel to the relay server.
///
/// Polled once per heartbeat by the session, never blocks.
pub trait RelayClient {
    /// Queues a message for the relay.
    fn send(&mut self, message: &ClientMessage) -> Result<(), RelayError>;

    /// Collects everything that arrived since the last poll, in arrival order.
    fn poll(&mut self) -> Vec<TransportEvent>;
}
