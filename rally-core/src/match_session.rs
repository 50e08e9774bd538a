//! The match session is the core entry point of the client.
//!
//! It owns the relay handle, the relay adapter and, while a match runs, the rally state machine
//! and the throw controller. The frontend drives it like a game loop:
//!
//! ```text
//! let relay = WebSocketRelay::connect("ws://127.0.0.1:5001/ws")?;
//! let mut session = MatchSession::new(relay, config, viewport, RngDeviation(rand::rng()));
//! loop {
//!     session.update(delta_time);
//!     while let Some(event) = session.next_event() {
//!         match event {
//!             SessionEvent::Connected => { session.set_name("Ada")?; }
//!             SessionEvent::NameRegistered(_) => { session.join_match("table-1")?; }
//!             SessionEvent::Rally(RallyEvent::BallHit) => { /* play a sound */ }
//!             SessionEvent::MatchFinished(result) => { /* show the result */ }
//!             SessionEvent::OpponentDisconnected => { /* show a notice */ }
//!             _ => {}
//!         }
//!     }
//!     // Pointer input goes to pointer_down / pointer_move / pointer_up / pointer_cancel.
//!     // Render from session.active_match().
//! }
//! ```
//!
//! Requests to the relay (`set_name`, `join_match`, `end_match`, `list_matches`) are
//! acknowledged. Local session state only changes once the acknowledgement arrives, a refusal
//! or a timeout is surfaced as [`SessionEvent::RequestFailed`] and never retried here.
//! Losing the connection tears everything down and is not retried either.

use crate::config::{GameConfig, PlayfieldLayout, Viewport};
use crate::error::{RelayError, SessionError};
use crate::physics::DeviationSource;
use crate::rally::{RallyEvent, RallyInput, RallyPhase, RallyStateMachine, Score};
use crate::relay_adapter::{Inbound, RelayAdapter, Reply};
use crate::throw_controller::{ControllerOutput, ThrowController};
use crate::timer::Timer;
use crate::traits::{RelayClient, TransportEvent};
use protocol::{ClientMessage, DEFAULT_MAX_SCORE, MatchListing, MatchMembership, PlayerPosition};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

pub type RequestId = u32;

/// A request that waits for its acknowledgement.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestKind {
    SetName(String),
    JoinMatch(String),
    EndMatch,
    ListMatches,
}

/// Terminal result of a match that was played to the end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchResult {
    pub won: bool,
    pub score: Score,
}

/// The different phases we may be in concerning the connection.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionState {
    /// Waiting for the transport to open.
    Connecting,
    Connected,
    /// The connection is gone, maybe with a reason.
    Disconnected { reason: Option<String> },
}

/// Everything the frontend gets told about.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Connected,
    /// The transport went away. All session state has been discarded.
    Disconnected { reason: String },
    NameRegistered(String),
    MatchJoined(String),
    MatchList(Vec<MatchListing>),
    /// We are in a match, but alone.
    WaitingForOpponent,
    MatchStarted {
        opponent_name: String,
        is_left_player: bool,
        max_score: u32,
    },
    /// Rally events, for sound and animation.
    Rally(RallyEvent),
    /// One side reached the maximum score. The relay gets told with an `EndMatch`.
    MatchFinished(MatchResult),
    /// The relay acknowledged that we left the match.
    MatchLeft,
    /// The opponent left the running match or the connection broke during it.
    OpponentDisconnected,
    RequestFailed {
        request_id: RequestId,
        kind: RequestKind,
        error: RelayError,
    },
}

/// A running match.
pub struct ActiveMatch {
    opponent_name: String,
    position: PlayerPosition,
    rally: RallyStateMachine,
    controller: ThrowController,
    /// An `EndMatch` is on its way. Pointer input is ignored until the relay answers.
    leaving: bool,
}

impl ActiveMatch {
    pub fn opponent_name(&self) -> &str {
        &self.opponent_name
    }

    pub fn is_left_player(&self) -> bool {
        self.position == PlayerPosition::Left
    }

    pub fn score(&self) -> Score {
        self.rally.score()
    }

    pub fn phase(&self) -> RallyPhase {
        self.rally.phase()
    }

    pub fn rally(&self) -> &RallyStateMachine {
        &self.rally
    }

    pub fn is_leaving(&self) -> bool {
        self.leaving
    }
}

pub struct MatchSession<R: RelayClient, D: DeviationSource> {
    relay: R,
    adapter: RelayAdapter,
    config: GameConfig,
    layout: PlayfieldLayout,
    /// Source of the racket hit deviation for all rallies of this session.
    deviation: D,
    connection_state: ConnectionState,
    /// Set once the relay acknowledged the name.
    local_name: Option<String>,
    /// Set once the relay acknowledged the join.
    current_match: Option<String>,
    next_request_id: RequestId,
    pending_requests: HashMap<RequestId, RequestKind>,
    ack_timer: Timer<RequestId>,
    active: Option<ActiveMatch>,
    event_que: VecDeque<SessionEvent>,
}

impl<R: RelayClient, D: DeviationSource> MatchSession<R, D> {
    pub fn new(relay: R, config: GameConfig, viewport: Viewport, deviation: D) -> Self {
        let layout = PlayfieldLayout::compute(&config, viewport);
        MatchSession {
            relay,
            adapter: RelayAdapter::new(),
            config,
            layout,
            deviation,
            connection_state: ConnectionState::Connecting,
            local_name: None,
            current_match: None,
            next_request_id: 1,
            pending_requests: HashMap::new(),
            ack_timer: Timer::new(),
            active: None,
            event_que: VecDeque::new(),
        }
    }

    /// The update should be called once a frame with the elapsed seconds. Processes the relay
    /// traffic, request timeouts and the simulation clock, in this order.
    pub fn update(&mut self, delta_time: f32) {
        // 1. Everything the transport has for us.
        for event in self.relay.poll() {
            match event {
                TransportEvent::Opened => {
                    info!("Connected to relay.");
                    self.connection_state = ConnectionState::Connected;
                    self.event_que.push_back(SessionEvent::Connected);
                }
                TransportEvent::Message(envelope) => {
                    if let Some(inbound) = self.adapter.inbound(envelope) {
                        self.process_inbound(inbound);
                    }
                }
                TransportEvent::Closed(reason) => {
                    self.tear_down_connection(reason);
                    // Nothing after a close is meaningful.
                    return;
                }
            }
        }

        // 2. Requests that did not get an answer in time.
        for request_id in self.ack_timer.update_and_get_list(delta_time as f64) {
            if let Some(kind) = self.pending_requests.remove(&request_id) {
                warn!(request_id, ?kind, "Request timed out.");
                let error = RelayError::AckTimeout(self.config.ack_timeout_secs);
                self.fail_request(request_id, kind, error);
            }
        }

        // 3. The simulation clock.
        if let Some(active) = self.active.as_mut() {
            active
                .rally
                .update(delta_time as f64 * 1000.0, &mut self.deviation);
        }
        self.flush_rally_events();
    }

    /// Gets the next event for the frontend, if any.
    pub fn next_event(&mut self) -> Option<SessionEvent> {
        self.event_que.pop_front()
    }

    pub fn connection_state(&self) -> &ConnectionState {
        &self.connection_state
    }

    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    pub fn current_match(&self) -> Option<&str> {
        self.current_match.as_deref()
    }

    pub fn active_match(&self) -> Option<&ActiveMatch> {
        self.active.as_ref()
    }

    pub fn layout(&self) -> &PlayfieldLayout {
        &self.layout
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn relay_mut(&mut self) -> &mut R {
        &mut self.relay
    }

    /// The viewport changed, everything geometric gets recomputed.
    pub fn resize(&mut self, viewport: Viewport) {
        self.layout = PlayfieldLayout::compute(&self.config, viewport);
        if let Some(active) = self.active.as_mut() {
            active.rally.resize(self.layout);
        }
    }

    // -----------------------------------
    // Requests.
    // -----------------------------------

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<RequestId, SessionError> {
        Ok(self.send_request(RequestKind::SetName(name.into()))?)
    }

    pub fn join_match(&mut self, match_id: impl Into<String>) -> Result<RequestId, SessionError> {
        if let Some(current) = &self.current_match {
            return Err(SessionError::AlreadyInMatch(current.clone()));
        }
        Ok(self.send_request(RequestKind::JoinMatch(match_id.into()))?)
    }

    /// Leaves the current match. A running match keeps going without local input and gets
    /// abandoned without result once the relay acknowledges. A failed request hands input back.
    pub fn end_match(&mut self) -> Result<RequestId, SessionError> {
        if self.current_match.is_none() && self.active.is_none() {
            return Err(SessionError::NoMatch);
        }
        let request_id = self.send_request(RequestKind::EndMatch)?;
        if let Some(active) = self.active.as_mut() {
            active.leaving = true;
            active.controller.cancel();
        }
        Ok(request_id)
    }

    pub fn list_matches(&mut self) -> Result<RequestId, SessionError> {
        Ok(self.send_request(RequestKind::ListMatches)?)
    }

    // -----------------------------------
    // Pointer input.
    // -----------------------------------

    pub fn pointer_down(&mut self, x: f64, y: f64) {
        if let Some(active) = self.playable_match() {
            active.controller.press(x, y);
        }
    }

    /// Repositions the racket while the pointer is pressed.
    pub fn pointer_move(&mut self, y: f64) {
        let Some(active) = self.playable_match() else {
            return;
        };
        let layout = active.rally.layout();
        let (min_racket_top, max_racket_top) = (layout.min_racket_top, layout.max_racket_top);
        let racket_top = active.rally.racket_top();
        if let Some(ControllerOutput::RacketMoved(top)) =
            active
                .controller
                .drag(y, racket_top, min_racket_top, max_racket_top)
        {
            active.rally.apply(RallyInput::RacketMoved(top));
        }
    }

    /// Releasing the pointer may throw the ball.
    pub fn pointer_up(&mut self, x: f64, y: f64) {
        let Some(active) = self.playable_match() else {
            return;
        };
        let enabled = active.rally.can_serve();
        if let Some(ControllerOutput::ServeRequested(velocity)) =
            active.controller.release(x, y, enabled)
        {
            active.rally.apply(RallyInput::ServeRequested(velocity));
        }
        self.flush_rally_events();
    }

    /// The pointer went up without a throw gesture.
    pub fn pointer_cancel(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.controller.cancel();
        }
    }

    // -----------------------------------
    // Internals.
    // -----------------------------------

    /// The running match, unless we are about to leave it.
    fn playable_match(&mut self) -> Option<&mut ActiveMatch> {
        self.active.as_mut().filter(|active| !active.leaving)
    }

    /// Reports a failed request. A failed `EndMatch` means the match goes on.
    fn fail_request(&mut self, request_id: RequestId, kind: RequestKind, error: RelayError) {
        if kind == RequestKind::EndMatch
            && let Some(active) = self.active.as_mut()
            && active.leaving
        {
            info!("Leaving failed, match continues.");
            active.leaving = false;
        }
        self.event_que.push_back(SessionEvent::RequestFailed {
            request_id,
            kind,
            error,
        });
    }

    /// Sends a request and arms its timeout. The id is allocated even if sending fails.
    fn send_request(&mut self, kind: RequestKind) -> Result<RequestId, RelayError> {
        if self.connection_state != ConnectionState::Connected {
            return Err(RelayError::NotConnected);
        }
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let message = match &kind {
            RequestKind::SetName(name) => ClientMessage::SetName {
                request_id,
                name: name.clone(),
            },
            RequestKind::JoinMatch(match_id) => ClientMessage::JoinMatch {
                request_id,
                match_id: match_id.clone(),
            },
            RequestKind::EndMatch => ClientMessage::EndMatch { request_id },
            RequestKind::ListMatches => ClientMessage::ListMatches { request_id },
        };
        self.relay.send(&message)?;
        debug!(request_id, ?kind, "Request sent.");
        self.pending_requests.insert(request_id, kind);
        self.ack_timer
            .start_timer(request_id, self.config.ack_timeout_secs as f64);
        Ok(request_id)
    }

    fn process_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Reply(reply) => self.process_reply(reply),
            Inbound::Membership(membership) => self.process_membership(membership),
            Inbound::Rally(input) => match self.active.as_mut() {
                Some(active) => {
                    active.rally.apply(input);
                    self.flush_rally_events();
                }
                None => debug!(?input, "Rally input without running match, ignored."),
            },
        }
    }

    fn process_reply(&mut self, reply: Reply) {
        let request_id = match &reply {
            Reply::Ack { request_id }
            | Reply::Refused { request_id, .. }
            | Reply::MatchList { request_id, .. } => *request_id,
        };
        let Some(kind) = self.pending_requests.remove(&request_id) else {
            debug!(request_id, "Reply for unknown or expired request, ignored.");
            return;
        };
        self.ack_timer.cancel_timer(request_id);

        match (reply, kind) {
            (Reply::Refused { reason, .. }, kind) => {
                warn!(request_id, ?kind, %reason, "Request refused.");
                self.fail_request(request_id, kind, RelayError::Refused(reason));
            }
            (Reply::MatchList { matches, .. }, _) => {
                self.event_que.push_back(SessionEvent::MatchList(matches));
            }
            (Reply::Ack { .. }, RequestKind::SetName(name)) => {
                self.local_name = Some(name.clone());
                self.event_que.push_back(SessionEvent::NameRegistered(name));
            }
            (Reply::Ack { .. }, RequestKind::JoinMatch(match_id)) => {
                info!(%match_id, "Joined match.");
                self.current_match = Some(match_id.clone());
                self.event_que.push_back(SessionEvent::MatchJoined(match_id));
            }
            (Reply::Ack { .. }, RequestKind::EndMatch) => {
                if self.active.take().is_some() {
                    info!("Match abandoned.");
                }
                self.current_match = None;
                self.event_que.push_back(SessionEvent::MatchLeft);
            }
            (Reply::Ack { .. }, RequestKind::ListMatches) => {
                self.event_que.push_back(SessionEvent::MatchList(Vec::new()));
            }
        }
    }

    fn process_membership(&mut self, membership: MatchMembership) {
        let position = match membership.position {
            Some(position) if membership.member_count >= 2 => position,
            Some(_) => {
                if !self.abort_match() {
                    self.event_que.push_back(SessionEvent::WaitingForOpponent);
                }
                return;
            }
            None => {
                self.abort_match();
                return;
            }
        };
        let opponent_name = membership.opponent_name.unwrap_or_default();
        let max_score = match membership.max_score {
            0 => DEFAULT_MAX_SCORE,
            max_score => max_score,
        };

        if let Some(active) = &self.active
            && active.position == position
            && active.opponent_name == opponent_name
        {
            debug!("Membership unchanged, match continues.");
            return;
        }

        let is_left_player = position == PlayerPosition::Left;
        info!(%opponent_name, is_left_player, "Match started.");
        self.active = Some(ActiveMatch {
            opponent_name: opponent_name.clone(),
            position,
            rally: RallyStateMachine::new(
                self.config.clone(),
                self.layout,
                is_left_player,
                max_score,
            ),
            controller: ThrowController::new(is_left_player, self.config.min_shooting_angle),
            leaving: false,
        });
        self.event_que.push_back(SessionEvent::MatchStarted {
            opponent_name,
            is_left_player,
            max_score,
        });
    }

    /// The opponent is gone while a match runs.
    /// Drops the running match. Returns whether there was one.
    fn abort_match(&mut self) -> bool {
        if self.active.take().is_none() {
            return false;
        }
        info!("Opponent left the match.");
        self.event_que.push_back(SessionEvent::OpponentDisconnected);
        true
    }

    /// Forwards the rally events to the relay and the frontend, ends a decided match.
    fn flush_rally_events(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let events = active.rally.drain_events();
        let leaving = active.leaving;

        let mut result = None;
        for event in events {
            if let Some(message) = RelayAdapter::outbound(&event)
                && let Err(error) = self.relay.send(&message)
            {
                warn!(%error, ?message, "Could not forward rally event.");
            }
            if let RallyEvent::MatchFinished { won, score } = event {
                result = Some(MatchResult { won, score });
            }
            self.event_que.push_back(SessionEvent::Rally(event));
        }

        let Some(result) = result else {
            return;
        };
        info!(won = result.won, score = ?result.score, "Match finished.");
        self.active = None;
        self.event_que.push_back(SessionEvent::MatchFinished(result));
        if leaving {
            // The pending `EndMatch` covers it.
            return;
        }
        let request_id = self.next_request_id;
        if let Err(error) = self.send_request(RequestKind::EndMatch) {
            self.event_que.push_back(SessionEvent::RequestFailed {
                request_id,
                kind: RequestKind::EndMatch,
                error,
            });
        }
    }

    /// Fatal to everything: state is discarded, pending requests fail, nothing is retried.
    fn tear_down_connection(&mut self, reason: String) {
        warn!(%reason, "Lost connection to relay.");
        self.abort_match();
        let mut pending: Vec<_> = self.pending_requests.drain().collect();
        pending.sort_by_key(|(request_id, _)| *request_id);
        for (request_id, kind) in pending {
            self.event_que.push_back(SessionEvent::RequestFailed {
                request_id,
                kind,
                error: RelayError::Closed(reason.clone()),
            });
        }
        self.ack_timer.clear();
        self.adapter.reset();
        self.local_name = None;
        self.current_match = None;
        self.connection_state = ConnectionState::Disconnected {
            reason: Some(reason.clone()),
        };
        self.event_que
            .push_back(SessionEvent::Disconnected { reason });
    }
}
