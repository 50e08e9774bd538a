use protocol::{
    BallHandoff, BallPosition, BallVelocity, ClientMessage, DEFAULT_MAX_SCORE, MatchListing,
    MatchMembership, PlayerPosition, RelayMessage, Sequenced,
};
use rally_core::match_session::{ConnectionState, MatchResult, RequestKind};
use rally_core::rally::{RallyEvent, RallyPhase, Score, Server};
use rally_core::{
    FixedDeviation, GameConfig, MatchSession, PlayfieldLayout, RelayClient, RelayError,
    SessionError, SessionEvent, TransportEvent, Viewport,
};
use std::collections::VecDeque;

/// Records everything sent, hands out whatever the test queued.
#[derive(Default)]
struct ScriptedRelay {
    sent: Vec<ClientMessage>,
    inbox: VecDeque<TransportEvent>,
    next_sequence: u64,
}

impl ScriptedRelay {
    fn push(&mut self, message: RelayMessage) {
        self.next_sequence += 1;
        self.push_sequenced(self.next_sequence, message);
    }

    fn push_sequenced(&mut self, sequence: u64, message: RelayMessage) {
        self.inbox
            .push_back(TransportEvent::Message(Sequenced { sequence, message }));
    }

    fn take_sent(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.sent)
    }
}

impl RelayClient for ScriptedRelay {
    fn send(&mut self, message: &ClientMessage) -> Result<(), RelayError> {
        self.sent.push(message.clone());
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        self.inbox.drain(..).collect()
    }
}

type Session = MatchSession<ScriptedRelay, FixedDeviation>;

const SQUARE: Viewport = Viewport {
    width: 1000.0,
    height: 1000.0,
};

fn drain(session: &mut Session) -> Vec<SessionEvent> {
    std::iter::from_fn(|| session.next_event()).collect()
}

fn connected_session(viewport: Viewport) -> Session {
    let mut relay = ScriptedRelay::default();
    relay.inbox.push_back(TransportEvent::Opened);
    let mut session = MatchSession::new(relay, GameConfig::default(), viewport, FixedDeviation(0.0));
    session.update(0.0);
    assert_eq!(drain(&mut session), vec![SessionEvent::Connected]);
    assert_eq!(session.connection_state(), &ConnectionState::Connected);
    session
}

fn membership(position: PlayerPosition, member_count: u32, max_score: u32) -> RelayMessage {
    RelayMessage::MatchMembership(MatchMembership {
        position: Some(position),
        member_count,
        opponent_name: (member_count > 1).then(|| "Bob".to_string()),
        max_score,
    })
}

fn start_match(session: &mut Session, position: PlayerPosition, max_score: u32) {
    session.relay_mut().push(membership(position, 2, max_score));
    session.update(0.0);
    assert_eq!(
        drain(session),
        vec![SessionEvent::MatchStarted {
            opponent_name: "Bob".to_string(),
            is_left_player: position == PlayerPosition::Left,
            max_score,
        }]
    );
}

fn handoff(top: f64) -> BallHandoff {
    BallHandoff {
        position: BallPosition { top, left: 3.0 },
        velocity: BallVelocity { x: 1.0, y: 0.0 },
    }
}

/// A horizontal throw for whoever sits on the given side.
fn serve_flat(session: &mut Session, is_left_player: bool) {
    let (from, to) = if is_left_player {
        (100.0, 200.0)
    } else {
        (900.0, 800.0)
    };
    session.pointer_down(from, 500.0);
    session.pointer_up(to, 500.0);
}

#[test]
fn requests_need_a_connection() {
    let mut session = MatchSession::new(
        ScriptedRelay::default(),
        GameConfig::default(),
        SQUARE,
        FixedDeviation(0.0),
    );
    assert_eq!(
        session.set_name("Ada"),
        Err(SessionError::Relay(RelayError::NotConnected))
    );
    assert!(session.relay().sent.is_empty());
    assert_eq!(session.end_match(), Err(SessionError::NoMatch));
}

#[test]
fn acknowledged_requests_change_state() {
    let mut session = connected_session(SQUARE);

    let name_request = session.set_name("Ada").unwrap();
    assert_eq!(
        session.relay_mut().take_sent(),
        vec![ClientMessage::SetName {
            request_id: name_request,
            name: "Ada".to_string()
        }]
    );
    assert_eq!(session.local_name(), None);
    session.relay_mut().push(RelayMessage::Ack {
        request_id: name_request,
    });
    session.update(0.0);
    assert_eq!(
        drain(&mut session),
        vec![SessionEvent::NameRegistered("Ada".to_string())]
    );
    assert_eq!(session.local_name(), Some("Ada"));

    let join_request = session.join_match("table-1").unwrap();
    assert_ne!(join_request, name_request);
    session.relay_mut().push(RelayMessage::Ack {
        request_id: join_request,
    });
    session.update(0.0);
    assert_eq!(
        drain(&mut session),
        vec![SessionEvent::MatchJoined("table-1".to_string())]
    );
    assert_eq!(session.current_match(), Some("table-1"));
    assert_eq!(
        session.join_match("table-2"),
        Err(SessionError::AlreadyInMatch("table-1".to_string()))
    );

    let list_request = session.list_matches().unwrap();
    let listing = vec![MatchListing {
        id: "table-1".to_string(),
        member_names: vec!["Ada".to_string()],
    }];
    session.relay_mut().push(RelayMessage::MatchList {
        request_id: list_request,
        matches: listing.clone(),
    });
    session.update(0.0);
    assert_eq!(drain(&mut session), vec![SessionEvent::MatchList(listing)]);
}

#[test]
fn refused_join_is_reported() {
    let mut session = connected_session(SQUARE);
    let request_id = session.join_match("table-1").unwrap();
    session.relay_mut().push(RelayMessage::Refused {
        request_id,
        reason: "Match is full".to_string(),
    });
    session.update(0.0);
    assert_eq!(
        drain(&mut session),
        vec![SessionEvent::RequestFailed {
            request_id,
            kind: RequestKind::JoinMatch("table-1".to_string()),
            error: RelayError::Refused("Match is full".to_string()),
        }]
    );
    assert_eq!(session.current_match(), None);
}

#[test]
fn unanswered_request_times_out_and_late_ack_is_ignored() {
    let mut session = connected_session(SQUARE);
    let request_id = session.set_name("Ada").unwrap();

    session.update(4.9);
    assert!(drain(&mut session).is_empty());
    session.update(0.2);
    assert_eq!(
        drain(&mut session),
        vec![SessionEvent::RequestFailed {
            request_id,
            kind: RequestKind::SetName("Ada".to_string()),
            error: RelayError::AckTimeout(5.0),
        }]
    );

    session.relay_mut().push(RelayMessage::Ack { request_id });
    session.update(0.0);
    assert!(drain(&mut session).is_empty());
    assert_eq!(session.local_name(), None);
}

#[test]
fn received_ball_is_placed_by_viewport_height() {
    let mut session = connected_session(Viewport {
        width: 1200.0,
        height: 1000.0,
    });
    start_match(&mut session, PlayerPosition::Right, 3);

    session
        .relay_mut()
        .push_sequenced(5, RelayMessage::ServeAnnounced);
    session.update(0.0);
    assert_eq!(
        session.active_match().unwrap().phase(),
        RallyPhase::BallAwayToOpponent
    );

    session
        .relay_mut()
        .push_sequenced(6, RelayMessage::BallHandoff(handoff(0.5)));
    session.update(0.0);
    let rally = session.active_match().unwrap().rally();
    assert_eq!(rally.phase(), RallyPhase::InRally);
    assert_eq!(rally.ball().position.top, 500.0);
    assert_eq!(rally.ball().position.left, 0.0);
    assert!(rally.ball_visible());
    assert_eq!(
        drain(&mut session),
        vec![
            SessionEvent::Rally(RallyEvent::OpponentServed),
            SessionEvent::Rally(RallyEvent::BallReceived)
        ]
    );
}

#[test]
fn returned_ball_is_placed_by_viewport_height_on_a_narrow_screen() {
    let viewport = Viewport {
        width: 800.0,
        height: 1000.0,
    };
    let mut session = connected_session(viewport);
    start_match(&mut session, PlayerPosition::Left, 3);
    serve_flat(&mut session, true);
    for _ in 0..200 {
        if session.active_match().unwrap().phase() == RallyPhase::BallAwayToOpponent {
            break;
        }
        session.update(0.01);
    }
    assert_eq!(
        session.active_match().unwrap().phase(),
        RallyPhase::BallAwayToOpponent
    );

    let returned = BallHandoff {
        velocity: BallVelocity { x: -1.0, y: 0.0 },
        ..handoff(0.5)
    };
    session.relay_mut().push(RelayMessage::BallHandoff(returned));
    session.update(0.0);
    let rally = session.active_match().unwrap().rally();
    assert_eq!(rally.phase(), RallyPhase::InRally);
    assert_eq!(rally.ball().position.top, 500.0);
    assert_eq!(
        rally.ball().position.left,
        rally.layout().ball_constraints.max_left
    );
}

#[test]
fn replayed_deliveries_change_nothing() {
    let mut session = connected_session(SQUARE);
    start_match(&mut session, PlayerPosition::Right, 3);
    session
        .relay_mut()
        .push_sequenced(5, RelayMessage::ServeAnnounced);
    session
        .relay_mut()
        .push_sequenced(6, RelayMessage::BallHandoff(handoff(0.5)));
    session.update(0.0);
    drain(&mut session);
    let ball = *session.active_match().unwrap().rally().ball();

    session
        .relay_mut()
        .push_sequenced(6, RelayMessage::BallHandoff(handoff(0.9)));
    session
        .relay_mut()
        .push_sequenced(5, RelayMessage::ServeAnnounced);
    session.update(0.0);

    assert!(drain(&mut session).is_empty());
    let active = session.active_match().unwrap();
    assert_eq!(active.phase(), RallyPhase::InRally);
    assert_eq!(*active.rally().ball(), ball);
}

#[test]
fn repeated_membership_keeps_the_rally() {
    let mut session = connected_session(SQUARE);
    start_match(&mut session, PlayerPosition::Left, 3);
    serve_flat(&mut session, true);
    assert_eq!(session.relay_mut().take_sent(), vec![ClientMessage::ServeAnnounced]);

    session.relay_mut().push(membership(PlayerPosition::Left, 2, 3));
    session.update(0.0);
    assert_eq!(
        drain(&mut session),
        vec![SessionEvent::Rally(RallyEvent::ServeAnnounced)]
    );
    assert_eq!(session.active_match().unwrap().phase(), RallyPhase::InRally);
}

#[test]
fn opponent_leaving_aborts_the_match() {
    let mut session = connected_session(SQUARE);
    start_match(&mut session, PlayerPosition::Left, 3);

    session.relay_mut().push(membership(PlayerPosition::Left, 1, 3));
    session.update(0.0);
    assert_eq!(drain(&mut session), vec![SessionEvent::OpponentDisconnected]);
    assert!(session.active_match().is_none());

    // Alone from the start is only waiting.
    session.relay_mut().push(membership(PlayerPosition::Left, 1, 3));
    session.update(0.0);
    assert_eq!(drain(&mut session), vec![SessionEvent::WaitingForOpponent]);
}

#[test]
fn refused_leave_keeps_the_match_going() {
    let mut session = connected_session(SQUARE);
    start_match(&mut session, PlayerPosition::Right, 3);

    let request_id = session.end_match().unwrap();
    assert_eq!(
        session.relay_mut().take_sent(),
        vec![ClientMessage::EndMatch { request_id }]
    );
    assert!(session.active_match().unwrap().is_leaving());

    session.relay_mut().push(RelayMessage::Refused {
        request_id,
        reason: "Not in a match".to_string(),
    });
    session.update(0.0);
    assert_eq!(
        drain(&mut session),
        vec![SessionEvent::RequestFailed {
            request_id,
            kind: RequestKind::EndMatch,
            error: RelayError::Refused("Not in a match".to_string()),
        }]
    );
    let active = session.active_match().unwrap();
    assert!(!active.is_leaving());
    assert_eq!(
        active.phase(),
        RallyPhase::AwaitingServe {
            server: Server::Opponent
        }
    );

    session.relay_mut().push(RelayMessage::ServeAnnounced);
    session.update(0.0);
    assert_eq!(
        session.active_match().unwrap().phase(),
        RallyPhase::BallAwayToOpponent
    );
}

#[test]
fn unanswered_leave_hands_input_back() {
    let mut session = connected_session(SQUARE);
    start_match(&mut session, PlayerPosition::Left, 3);
    let request_id = session.end_match().unwrap();
    session.relay_mut().take_sent();

    session.update(5.5);
    assert_eq!(
        drain(&mut session),
        vec![SessionEvent::RequestFailed {
            request_id,
            kind: RequestKind::EndMatch,
            error: RelayError::AckTimeout(5.0),
        }]
    );
    assert!(!session.active_match().unwrap().is_leaving());

    serve_flat(&mut session, true);
    assert_eq!(session.relay_mut().take_sent(), vec![ClientMessage::ServeAnnounced]);
}

#[test]
fn acknowledged_leave_drops_the_match() {
    let mut session = connected_session(SQUARE);
    start_match(&mut session, PlayerPosition::Left, 3);

    let request_id = session.end_match().unwrap();
    session.relay_mut().take_sent();

    // No throws while the leave is pending.
    serve_flat(&mut session, true);
    session.update(0.01);
    assert!(session.relay_mut().take_sent().is_empty());
    assert!(drain(&mut session).is_empty());
    assert!(session.active_match().unwrap().rally().can_serve());

    session.relay_mut().push(RelayMessage::Ack { request_id });
    session.update(0.0);
    assert_eq!(drain(&mut session), vec![SessionEvent::MatchLeft]);
    assert!(session.active_match().is_none());
    assert_eq!(session.current_match(), None);
}

#[test]
fn resize_recomputes_the_court_of_the_running_match() {
    let mut session = connected_session(SQUARE);
    start_match(&mut session, PlayerPosition::Left, 3);

    session.pointer_down(20.0, 500.0);
    session.pointer_move(2000.0);
    session.pointer_cancel();
    let square_bottom = session.layout().max_racket_top;
    assert_eq!(
        session.active_match().unwrap().rally().racket_top(),
        square_bottom
    );

    let short = Viewport {
        width: 1000.0,
        height: 500.0,
    };
    session.resize(short);
    let expected = PlayfieldLayout::compute(&GameConfig::default(), short);
    assert_eq!(*session.layout(), expected);

    let rally = session.active_match().unwrap().rally();
    assert_eq!(*rally.layout(), expected);
    assert!(expected.max_racket_top < square_bottom);
    assert_eq!(rally.racket_top(), expected.max_racket_top);
    assert!(rally.can_serve());
}

#[test]
fn missing_max_score_falls_back_to_default() {
    let mut session = connected_session(SQUARE);
    session.relay_mut().push(membership(PlayerPosition::Right, 2, 0));
    session.update(0.0);
    assert_eq!(
        drain(&mut session),
        vec![SessionEvent::MatchStarted {
            opponent_name: "Bob".to_string(),
            is_left_player: false,
            max_score: DEFAULT_MAX_SCORE,
        }]
    );
    assert_eq!(
        session.active_match().unwrap().score().max_score,
        DEFAULT_MAX_SCORE
    );
}

#[test]
fn closed_connection_tears_everything_down() {
    let mut session = connected_session(SQUARE);
    start_match(&mut session, PlayerPosition::Left, 3);
    let request_id = session.list_matches().unwrap();

    session
        .relay_mut()
        .inbox
        .push_back(TransportEvent::Closed("Connection closed by server".to_string()));
    session.update(0.0);
    assert_eq!(
        drain(&mut session),
        vec![
            SessionEvent::OpponentDisconnected,
            SessionEvent::RequestFailed {
                request_id,
                kind: RequestKind::ListMatches,
                error: RelayError::Closed("Connection closed by server".to_string()),
            },
            SessionEvent::Disconnected {
                reason: "Connection closed by server".to_string()
            }
        ]
    );
    assert!(session.active_match().is_none());
    assert_eq!(
        session.connection_state(),
        &ConnectionState::Disconnected {
            reason: Some("Connection closed by server".to_string())
        }
    );
    assert_eq!(
        session.set_name("Ada"),
        Err(SessionError::Relay(RelayError::NotConnected))
    );
}

#[test]
fn match_ends_at_max_score_and_is_left() {
    let mut session = connected_session(SQUARE);
    start_match(&mut session, PlayerPosition::Left, 2);
    serve_flat(&mut session, true);
    session.relay_mut().push(RelayMessage::BallLostAnnounced);
    session.relay_mut().push(RelayMessage::ServeAnnounced);
    session.relay_mut().push(RelayMessage::BallLostAnnounced);
    session.update(0.0);

    let final_score = Score {
        own: 2,
        opponent: 0,
        max_score: 2,
    };
    let events = drain(&mut session);
    assert!(events.contains(&SessionEvent::Rally(RallyEvent::MatchFinished {
        won: true,
        score: final_score
    })));
    assert_eq!(
        events.last(),
        Some(&SessionEvent::MatchFinished(MatchResult {
            won: true,
            score: final_score
        }))
    );
    assert!(session.active_match().is_none());

    let sent = session.relay_mut().take_sent();
    let Some(&ClientMessage::EndMatch { request_id }) = sent.last() else {
        panic!("Expected an EndMatch request, got {sent:?}");
    };
    session.relay_mut().push(RelayMessage::Ack { request_id });
    session.update(0.0);
    assert_eq!(drain(&mut session), vec![SessionEvent::MatchLeft]);
}

/// Two sessions wired through an in-memory relay that acknowledges every request.
struct Table {
    left: Session,
    right: Session,
    left_events: Vec<SessionEvent>,
    right_events: Vec<SessionEvent>,
}

impl Table {
    fn new(left_viewport: Viewport, right_viewport: Viewport, max_score: u32) -> Self {
        let mut left = connected_session(left_viewport);
        let mut right = connected_session(right_viewport);
        start_match(&mut left, PlayerPosition::Left, max_score);
        start_match(&mut right, PlayerPosition::Right, max_score);
        Table {
            left,
            right,
            left_events: Vec::new(),
            right_events: Vec::new(),
        }
    }

    fn step(&mut self, seconds: f32) {
        self.left.update(seconds);
        self.right.update(seconds);
        let from_left = self.left.relay_mut().take_sent();
        let from_right = self.right.relay_mut().take_sent();
        forward(from_left, self.left.relay_mut(), self.right.relay_mut());
        forward(from_right, self.right.relay_mut(), self.left.relay_mut());
        self.left_events.extend(drain(&mut self.left));
        self.right_events.extend(drain(&mut self.right));
    }

    /// Steps in 10ms frames until the condition holds.
    fn run_until(&mut self, max_frames: usize, done: impl Fn(&Table) -> bool) {
        for _ in 0..max_frames {
            if done(self) {
                return;
            }
            self.step(0.01);
        }
        assert!(done(self), "Condition not reached in {max_frames} frames");
    }
}

fn forward(messages: Vec<ClientMessage>, own: &mut ScriptedRelay, other: &mut ScriptedRelay) {
    for message in messages {
        match message {
            ClientMessage::SetName { request_id, .. }
            | ClientMessage::JoinMatch { request_id, .. }
            | ClientMessage::EndMatch { request_id } => {
                own.push(RelayMessage::Ack { request_id })
            }
            ClientMessage::ListMatches { request_id } => own.push(RelayMessage::MatchList {
                request_id,
                matches: Vec::new(),
            }),
            ClientMessage::ServeAnnounced => other.push(RelayMessage::ServeAnnounced),
            ClientMessage::BallLostAnnounced => other.push(RelayMessage::BallLostAnnounced),
            ClientMessage::BallHandoff(handoff) => other.push(RelayMessage::BallHandoff(handoff)),
        }
    }
}

fn handoff_of(events: &[SessionEvent]) -> Option<BallHandoff> {
    events.iter().find_map(|event| match event {
        SessionEvent::Rally(RallyEvent::BallHandoff(handoff)) => Some(*handoff),
        _ => None,
    })
}

#[test]
fn ball_crosses_between_different_screens() {
    let mut table = Table::new(
        Viewport {
            width: 800.0,
            height: 1000.0,
        },
        Viewport {
            width: 1200.0,
            height: 1000.0,
        },
        3,
    );
    serve_flat(&mut table.left, true);
    table.step(0.0);
    table.run_until(300, |t| {
        t.right_events
            .contains(&SessionEvent::Rally(RallyEvent::BallReceived))
    });

    let sent = handoff_of(&table.left_events).unwrap();
    assert!(sent.position.top > 0.0 && sent.position.top < 1.0);
    assert!(!table.left.active_match().unwrap().rally().ball_visible());
    let right_rally = table.right.active_match().unwrap().rally();
    assert!(right_rally.ball_visible());
    assert!((right_rally.ball().position.top - sent.position.top * 1000.0).abs() < 1e-6);
    assert_eq!(right_rally.ball().velocity, sent.velocity);
}

#[test]
fn missed_ball_scores_for_the_opponent() {
    let mut table = Table::new(
        Viewport {
            width: 800.0,
            height: 1000.0,
        },
        Viewport {
            width: 1200.0,
            height: 1000.0,
        },
        3,
    );
    serve_flat(&mut table.left, true);
    table.step(0.0);

    // The right player pulls the racket to the very top, far away from the ball.
    table.right.pointer_down(1100.0, 500.0);
    table.right.pointer_move(0.0);
    table.right.pointer_cancel();
    assert_eq!(table.right.active_match().unwrap().rally().racket_top(), 0.0);

    table.run_until(600, |t| t.left.active_match().unwrap().score().own == 1);
    assert_eq!(
        table.left.active_match().unwrap().phase(),
        RallyPhase::AwaitingServe {
            server: Server::Opponent
        }
    );
    assert!(
        table
            .right_events
            .contains(&SessionEvent::Rally(RallyEvent::BallLost))
    );

    // The loss settles before it gets booked on the losing side.
    table.run_until(100, |t| t.right.active_match().unwrap().score().opponent == 1);
    let right = table.right.active_match().unwrap();
    assert_eq!(
        right.phase(),
        RallyPhase::AwaitingServe {
            server: Server::Local
        }
    );
    let layout = right.rally().layout();
    assert_eq!(right.rally().racket_top(), layout.centered_racket_top());
    assert!(right.rally().can_serve());
}

#[test]
fn both_sides_finish_the_match() {
    let mut table = Table::new(SQUARE, SQUARE, 1);
    serve_flat(&mut table.left, true);
    table.step(0.0);
    table.right.pointer_down(900.0, 500.0);
    table.right.pointer_move(1000.0);
    table.right.pointer_cancel();

    table.run_until(600, |t| {
        t.left_events.contains(&SessionEvent::MatchLeft)
            && t.right_events.contains(&SessionEvent::MatchLeft)
    });
    assert!(table.left_events.contains(&SessionEvent::MatchFinished(MatchResult {
        won: true,
        score: Score {
            own: 1,
            opponent: 0,
            max_score: 1
        }
    })));
    assert!(table.right_events.contains(&SessionEvent::MatchFinished(MatchResult {
        won: false,
        score: Score {
            own: 0,
            opponent: 1,
            max_score: 1
        }
    })));
    assert!(table.left.active_match().is_none());
    assert!(table.right.active_match().is_none());
}
