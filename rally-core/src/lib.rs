//! Client core of a two player pong game played over a relay server.
//!
//! Each client simulates the ball only while it is on its own half of the court. When the ball
//! crosses the middle it gets handed to the opponent via the relay, when it is missed the loss
//! gets announced. The [`match_session::MatchSession`] is the entry point for a frontend.

pub mod codec;
pub mod config;
pub mod error;
pub mod match_session;
pub mod physics;
pub mod rally;
pub mod relay_adapter;
pub mod throw_controller;
pub mod timer;
pub mod traits;
pub mod web_socket_interface;

pub use config::{GameConfig, PlayfieldLayout, Viewport};
pub use error::{CodecError, ConfigError, RelayError, SessionError};
pub use match_session::{MatchResult, MatchSession, SessionEvent};
pub use physics::{DeviationSource, FixedDeviation, RngDeviation};
pub use traits::{RelayClient, TransportEvent};
