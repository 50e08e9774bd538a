//! The per match rally state machine.
//!
//! ```text
//!                 ServeRequested / OpponentServed
//!  AwaitingServe ─────────────────────────────────► InRally ◄──────────────┐
//!       ▲                   (opponent serves:        │  │                  │ BallReceived
//!       │                    BallAwayToOpponent)     │  └─► BallAwayToOpponent
//!       │                          BallLost + 500ms  │          (Handoff)
//!       │                                            ▼
//!       └──────────────────────────────────── RoundEnding ◄── OpponentLostBall
//! ```
//!
//! This is the only place that mutates the phase, the score, the ball and the racket. Inputs
//! come in through [`RallyStateMachine::apply`], time through [`RallyStateMachine::update`]. The
//! simulation clock runs with a fixed period and only while the phase is [`RallyPhase::InRally`].
//! Everything the outside world has to know about gets queued as a [`RallyEvent`] and is collected
//! with [`RallyStateMachine::drain_events`].

use crate::config::{GameConfig, PlayfieldLayout};
use crate::physics::{BallState, DeviationSource, RacketSpan, SideEffect, advance};
use crate::timer::Timer;
use protocol::{BallHandoff, BallPosition, BallVelocity};
use std::f64::consts::FRAC_1_SQRT_2;
use tracing::{debug, warn};

/// Who has to serve the next rally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Server {
    Local,
    Opponent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RallyPhase {
    /// No rally running. With [`Server::Local`] the ball sits on our racket and waits for a throw.
    AwaitingServe { server: Server },
    /// The ball is on our side and simulated locally.
    InRally,
    /// The ball is on the opponent's side, we wait for it to come back.
    BallAwayToOpponent,
    /// A point has been booked. The phase stays here once the match is decided.
    RoundEnding { won: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Score {
    pub own: u32,
    pub opponent: u32,
    pub max_score: u32,
}

impl Score {
    pub fn new(max_score: u32) -> Self {
        Score {
            own: 0,
            opponent: 0,
            max_score,
        }
    }

    /// One side reached the maximum score.
    pub fn is_decided(&self) -> bool {
        self.own >= self.max_score || self.opponent >= self.max_score
    }

    /// Books a point. Nothing changes once the match is decided.
    pub fn record(&mut self, won: bool) -> bool {
        if self.is_decided() {
            return false;
        }
        if won {
            self.own += 1;
        } else {
            self.opponent += 1;
        }
        true
    }
}

/// Inputs to the state machine, from the local player or translated from the relay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RallyInput {
    /// A valid throw gesture.
    ServeRequested(BallVelocity),
    /// New top of the local racket.
    RacketMoved(f64),
    /// The opponent served.
    OpponentServed,
    /// The ball came over from the opponent.
    BallReceived(BallHandoff),
    /// The opponent missed the ball.
    OpponentLostBall,
}

/// What happened. The first three variants have to go to the relay, the rest is for the caller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RallyEvent {
    ServeAnnounced,
    /// The ball left our court, the top is already normalized.
    BallHandoff(BallHandoff),
    BallLostAnnounced,
    BallHit,
    BallBounced,
    BallLost,
    OpponentServed,
    BallReceived,
    RoundEnded { won: bool, score: Score },
    MatchFinished { won: bool, score: Score },
}

#[derive(Clone, Copy, PartialEq)]
enum RallyTimer {
    LossSettle,
}

pub struct RallyStateMachine {
    config: GameConfig,
    layout: PlayfieldLayout,
    is_left_player: bool,
    phase: RallyPhase,
    score: Score,
    ball: BallState,
    racket_top: f64,
    /// Time accumulated for the simulation clock that has not been simulated yet.
    clock_ms: f64,
    timer: Timer<RallyTimer>,
    events: Vec<RallyEvent>,
}

impl RallyStateMachine {
    /// A fresh match. The left player serves first.
    pub fn new(
        config: GameConfig,
        layout: PlayfieldLayout,
        is_left_player: bool,
        max_score: u32,
    ) -> Self {
        let server = if is_left_player {
            Server::Local
        } else {
            Server::Opponent
        };
        let mut machine = RallyStateMachine {
            config,
            layout,
            is_left_player,
            phase: RallyPhase::AwaitingServe { server },
            score: Score::new(max_score),
            ball: BallState {
                position: BallPosition::default(),
                velocity: serve_velocity(),
                bounce: true,
            },
            racket_top: layout.centered_racket_top(),
            clock_ms: 0.0,
            timer: Timer::new(),
            events: Vec::new(),
        };
        machine.glue_ball_to_racket();
        machine
    }

    pub fn phase(&self) -> RallyPhase {
        self.phase
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn ball(&self) -> &BallState {
        &self.ball
    }

    pub fn racket_top(&self) -> f64 {
        self.racket_top
    }

    pub fn racket_span(&self) -> RacketSpan {
        RacketSpan::new(self.racket_top, self.layout.racket_height)
    }

    pub fn layout(&self) -> &PlayfieldLayout {
        &self.layout
    }

    pub fn is_left_player(&self) -> bool {
        self.is_left_player
    }

    pub fn is_finished(&self) -> bool {
        self.score.is_decided()
    }

    /// The local player may throw the ball.
    pub fn can_serve(&self) -> bool {
        self.phase
            == RallyPhase::AwaitingServe {
                server: Server::Local,
            }
            && !self.is_finished()
    }

    /// The ball is on our side of the court and should be rendered.
    pub fn ball_visible(&self) -> bool {
        match self.phase {
            RallyPhase::AwaitingServe { server } => server == Server::Local,
            RallyPhase::InRally => true,
            RallyPhase::BallAwayToOpponent => false,
            RallyPhase::RoundEnding { won } => !won,
        }
    }

    /// The local player missed the ball and the point is about to be booked.
    pub fn is_settling_loss(&self) -> bool {
        self.timer.is_running(RallyTimer::LossSettle)
    }

    /// Collects and clears all events since the last drain.
    pub fn drain_events(&mut self) -> Vec<RallyEvent> {
        std::mem::take(&mut self.events)
    }

    /// The single entry point for discrete inputs.
    pub fn apply(&mut self, input: RallyInput) {
        if let RallyInput::RacketMoved(top) = input {
            self.racket_top = self.layout.clamp_racket_top(top);
            if self.can_serve() {
                self.glue_ball_to_racket();
            }
            return;
        }
        if self.is_finished() {
            debug!(?input, "Match is decided, input ignored.");
            return;
        }

        match (self.phase, input) {
            (
                RallyPhase::AwaitingServe {
                    server: Server::Local,
                },
                RallyInput::ServeRequested(velocity),
            ) => {
                if !velocity.is_finite() || velocity.x == 0.0 {
                    warn!(?velocity, "Serve with unusable velocity ignored.");
                    return;
                }
                self.glue_ball_to_racket();
                self.ball.velocity = velocity;
                self.ball.bounce = true;
                self.events.push(RallyEvent::ServeAnnounced);
                self.enter(RallyPhase::InRally);
            }
            (
                RallyPhase::AwaitingServe {
                    server: Server::Opponent,
                },
                RallyInput::OpponentServed,
            ) => {
                self.events.push(RallyEvent::OpponentServed);
                self.enter(RallyPhase::BallAwayToOpponent);
            }
            (RallyPhase::BallAwayToOpponent, RallyInput::BallReceived(handoff)) => {
                self.receive_ball(handoff);
            }
            (phase, RallyInput::OpponentLostBall)
                if !matches!(phase, RallyPhase::RoundEnding { .. }) && !self.is_settling_loss() =>
            {
                self.finish_round(true);
            }
            (phase, input) => {
                warn!(?phase, ?input, "Input does not fit the rally phase, ignored.");
            }
        }
    }

    /// Advances the time by `delta_ms`. Runs the settle timer and, while in rally, as many
    /// simulation ticks as fit into the accumulated time. A lost ball keeps drifting while the
    /// loss settles.
    pub fn update(&mut self, delta_ms: f64, deviation: &mut impl DeviationSource) {
        for timer_id in self.timer.update_and_get_list(delta_ms) {
            match timer_id {
                RallyTimer::LossSettle => self.finish_round(false),
            }
        }

        if self.phase != RallyPhase::InRally {
            return;
        }
        self.clock_ms += delta_ms;
        let period = self.config.tick_period_ms;
        while self.phase == RallyPhase::InRally && self.clock_ms >= period {
            self.clock_ms -= period;
            self.tick(deviation);
        }
    }

    /// The viewport changed. The ball keeps its pixel position, the racket gets clamped.
    pub fn resize(&mut self, layout: PlayfieldLayout) {
        self.layout = layout;
        self.racket_top = self.layout.clamp_racket_top(self.racket_top);
        if self.can_serve() {
            self.glue_ball_to_racket();
        }
    }

    /// One step of the simulation clock.
    fn tick(&mut self, deviation: &mut impl DeviationSource) {
        let result = advance(
            &self.ball,
            self.config.tick_period_ms,
            &self.layout.ball_constraints,
            self.is_left_player,
            self.racket_span(),
            &self.config,
            deviation,
        );
        self.ball = result.ball;

        for effect in result.side_effects {
            match effect {
                SideEffect::BallHit => self.events.push(RallyEvent::BallHit),
                SideEffect::BallBounce => self.events.push(RallyEvent::BallBounced),
                SideEffect::BallLost => {
                    // The ball keeps drifting off court until the settle timer books the point.
                    self.events.push(RallyEvent::BallLost);
                    self.events.push(RallyEvent::BallLostAnnounced);
                    self.timer
                        .start_timer(RallyTimer::LossSettle, self.config.loss_settle_ms);
                }
                SideEffect::Handoff { position, velocity } => {
                    let handoff = BallHandoff {
                        position: BallPosition {
                            top: position.top / self.layout.viewport.height,
                            left: position.left,
                        },
                        velocity,
                    };
                    self.events.push(RallyEvent::BallHandoff(handoff));
                    self.enter(RallyPhase::BallAwayToOpponent);
                }
            }
        }
    }

    /// Places the ball from the opponent at our mid-court edge.
    fn receive_ball(&mut self, handoff: BallHandoff) {
        let constraints = &self.layout.ball_constraints;
        let left = if self.is_left_player {
            constraints.max_left
        } else {
            constraints.min_left
        };
        self.ball = BallState {
            position: BallPosition {
                top: handoff.position.top * self.layout.viewport.height,
                left,
            },
            velocity: handoff.velocity,
            bounce: true,
        };
        self.events.push(RallyEvent::BallReceived);
        self.enter(RallyPhase::InRally);
    }

    /// Books the point and prepares the next serve. The loser of the point serves.
    fn finish_round(&mut self, won: bool) {
        self.timer.cancel_timer(RallyTimer::LossSettle);
        self.enter(RallyPhase::RoundEnding { won });
        self.score.record(won);
        self.events.push(RallyEvent::RoundEnded {
            won,
            score: self.score,
        });

        if self.score.is_decided() {
            let won_match = self.score.own >= self.score.max_score;
            self.ball.bounce = false;
            self.events.push(RallyEvent::MatchFinished {
                won: won_match,
                score: self.score,
            });
            return;
        }

        if !won {
            self.racket_top = self.layout.centered_racket_top();
        }
        self.ball.velocity = serve_velocity();
        self.ball.bounce = true;
        let server = if won { Server::Opponent } else { Server::Local };
        self.enter(RallyPhase::AwaitingServe { server });
        self.glue_ball_to_racket();
    }

    fn enter(&mut self, phase: RallyPhase) {
        if phase != self.phase {
            debug!(from = ?self.phase, to = ?phase, "Rally phase change.");
        }
        // The simulation clock only lives within a rally.
        self.clock_ms = 0.0;
        self.phase = phase;
    }

    /// The serving ball sits centered on the local racket.
    fn glue_ball_to_racket(&mut self) {
        let constraints = &self.layout.ball_constraints;
        self.ball.position = BallPosition {
            top: self.racket_top + self.layout.racket_height / 2.0 - self.layout.ball_size / 2.0,
            left: if self.is_left_player {
                constraints.min_left
            } else {
                constraints.max_left
            },
        };
    }
}

fn serve_velocity() -> BallVelocity {
    BallVelocity {
        x: FRAC_1_SQRT_2,
        y: FRAC_1_SQRT_2,
    }
}
