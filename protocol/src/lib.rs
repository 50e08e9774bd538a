//! The message contract between a pong client and the relay server.
//! Used consistently by the client core and by any relay implementation.
//!
//! Requests that expect an answer (`SetName`, `JoinMatch`, `EndMatch`, `ListMatches`) carry a
//! `request_id` that the relay echoes in its reply. Everything else is fire-and-forget.
//! Every relay -> client push is wrapped in a [`Sequenced`] envelope.

use serde::{Deserialize, Serialize};

/// The version byte every frame starts with. Frames with another version get dropped.
pub const PROTOCOL_VERSION: u8 = 1;

/// The score a match is played to, if the relay does not say otherwise.
pub const DEFAULT_MAX_SCORE: u32 = 3;

/// Position of the ball in pixels. In a [`BallHandoff`] the `top` is normalized by the viewport height.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct BallPosition {
    pub top: f64,
    pub left: f64,
}

/// Unit length direction of the ball. The displacement gets scaled by the base velocity.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct BallVelocity {
    pub x: f64,
    pub y: f64,
}

impl BallVelocity {
    /// Both components are real numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// The ball thrown over to the opponent.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct BallHandoff {
    /// `top` in [0, 1] relative to the sender's viewport height, `left` in sender pixels.
    pub position: BallPosition,
    pub velocity: BallVelocity,
}

/// The side of the court a player defends.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerPosition {
    Left,
    Right,
}

/// Pushed by the relay whenever the members of the joined match change.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MatchMembership {
    /// Our own side, `None` if we are not part of a match anymore.
    pub position: Option<PlayerPosition>,
    pub member_count: u32,
    pub opponent_name: Option<String>,
    pub max_score: u32,
}

/// One entry of the match list.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MatchListing {
    pub id: String,
    pub member_names: Vec<String>,
}

/// Client -> Relay.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum ClientMessage {
    /// Registers the display name. Acknowledged.
    SetName { request_id: u32, name: String },
    /// Joins (or creates) a match. Acknowledged, refused if the match is full.
    JoinMatch { request_id: u32, match_id: String },
    /// Leaves the current match gracefully. Acknowledged.
    EndMatch { request_id: u32 },
    /// Asks for the open matches. Answered with [`RelayMessage::MatchList`].
    ListMatches { request_id: u32 },
    /// We served, forwarded to the opponent.
    ServeAnnounced,
    /// We lost the ball, forwarded to the opponent.
    BallLostAnnounced,
    /// The ball left our court, forwarded to the opponent.
    BallHandoff(BallHandoff),
}

/// Relay -> Client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum RelayMessage {
    /// Positive answer to a request.
    Ack { request_id: u32 },
    /// Negative answer to a request.
    Refused { request_id: u32, reason: String },
    /// Answer to [`ClientMessage::ListMatches`].
    MatchList {
        request_id: u32,
        matches: Vec<MatchListing>,
    },
    MatchMembership(MatchMembership),
    BallHandoff(BallHandoff),
    ServeAnnounced,
    BallLostAnnounced,
}

/// Envelope for relay pushes. The sequence number is strictly increasing per connection.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Sequenced<T> {
    pub sequence: u64,
    pub message: T,
}
