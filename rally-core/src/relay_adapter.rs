//! Translates between rally events and relay messages. Never touches game state itself.
//!
//! Inbound pushes carry a strictly increasing sequence number. The adapter remembers the last
//! applied number per event source and drops everything that is not newer, so a replayed
//! delivery can never apply a serve, a handoff or a lost ball twice.

use crate::rally::{RallyEvent, RallyInput};
use protocol::{ClientMessage, MatchListing, MatchMembership, RelayMessage, Sequenced};
use std::collections::HashMap;
use tracing::{debug, warn};

/// The independent streams inbound messages get deduplicated on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventSource {
    Membership,
    Serve,
    Handoff,
    BallLost,
    Reply,
}

impl EventSource {
    pub fn of(message: &RelayMessage) -> Self {
        match message {
            RelayMessage::Ack { .. }
            | RelayMessage::Refused { .. }
            | RelayMessage::MatchList { .. } => EventSource::Reply,
            RelayMessage::MatchMembership(_) => EventSource::Membership,
            RelayMessage::BallHandoff(_) => EventSource::Handoff,
            RelayMessage::ServeAnnounced => EventSource::Serve,
            RelayMessage::BallLostAnnounced => EventSource::BallLost,
        }
    }
}

/// Remembers the last applied sequence number per source.
#[derive(Default, Debug)]
pub struct SequenceGuard {
    last_applied: HashMap<EventSource, u64>,
}

impl SequenceGuard {
    /// True if the message is newer than everything applied from this source so far.
    pub fn admit(&mut self, source: EventSource, sequence: u64) -> bool {
        match self.last_applied.get(&source) {
            Some(&last) if sequence <= last => false,
            _ => {
                self.last_applied.insert(source, sequence);
                true
            }
        }
    }

    /// Forgets everything, used when the connection goes away.
    pub fn reset(&mut self) {
        self.last_applied.clear();
    }
}

/// Answer to one of our requests.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Ack { request_id: u32 },
    Refused { request_id: u32, reason: String },
    MatchList {
        request_id: u32,
        matches: Vec<MatchListing>,
    },
}

/// An inbound message after translation.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Rally(RallyInput),
    Membership(MatchMembership),
    Reply(Reply),
}

#[derive(Default)]
pub struct RelayAdapter {
    guard: SequenceGuard,
}

impl RelayAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The relay message for a rally event, if the opponent has to know about it.
    pub fn outbound(event: &RallyEvent) -> Option<ClientMessage> {
        match event {
            RallyEvent::ServeAnnounced => Some(ClientMessage::ServeAnnounced),
            RallyEvent::BallLostAnnounced => Some(ClientMessage::BallLostAnnounced),
            RallyEvent::BallHandoff(handoff) => Some(ClientMessage::BallHandoff(*handoff)),
            _ => None,
        }
    }

    /// Translates an inbound push. Repeated or malformed deliveries yield `None`.
    pub fn inbound(&mut self, envelope: Sequenced<RelayMessage>) -> Option<Inbound> {
        let Sequenced { sequence, message } = envelope;
        let source = EventSource::of(&message);
        if !self.guard.admit(source, sequence) {
            debug!(?source, sequence, "Dropping already processed relay message.");
            return None;
        }

        let inbound = match message {
            RelayMessage::Ack { request_id } => Inbound::Reply(Reply::Ack { request_id }),
            RelayMessage::Refused { request_id, reason } => {
                Inbound::Reply(Reply::Refused { request_id, reason })
            }
            RelayMessage::MatchList {
                request_id,
                matches,
            } => Inbound::Reply(Reply::MatchList {
                request_id,
                matches,
            }),
            RelayMessage::MatchMembership(membership) => Inbound::Membership(membership),
            RelayMessage::ServeAnnounced => Inbound::Rally(RallyInput::OpponentServed),
            RelayMessage::BallLostAnnounced => Inbound::Rally(RallyInput::OpponentLostBall),
            RelayMessage::BallHandoff(handoff) => {
                let top = handoff.position.top;
                if !handoff.velocity.is_finite() || !top.is_finite() {
                    warn!(?handoff, "Dropping malformed ball handoff.");
                    return None;
                }
                Inbound::Rally(RallyInput::BallReceived(handoff))
            }
        };
        Some(inbound)
    }

    pub fn reset(&mut self) {
        self.guard.reset();
    }
}
