//! The ball integrator.
//!
//! [`advance`] is a pure function: everything it needs gets passed in and the new ball state is
//! returned together with the side effects the caller has to act on. The only non deterministic
//! input is the deviation drawn on a racket hit, which comes from an injected [`DeviationSource`].
//!
//! The court is seen from the local client. The edge next to the local racket is the
//! racket edge (hit or miss gets resolved here), the opposite edge is the mid-court edge
//! (the ball leaves towards the opponent).
//!
//! ```text
//!  left player                                 right player
//!  ┃ racket edge        mid-court edge ┃      ┃ mid-court edge       racket edge ┃
//!  ┃◄── min_left              max_left ──►    ◄── min_left            max_left ──►┃
//! ```

use crate::config::GameConfig;
use protocol::{BallPosition, BallVelocity};
use rand::Rng;

/// The box the top left corner of the ball may move in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BallConstraints {
    pub min_top: f64,
    pub max_top: f64,
    pub min_left: f64,
    pub max_left: f64,
    /// Edge length of the ball.
    pub size: f64,
}

/// Vertical extent of the local racket.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RacketSpan {
    pub top: f64,
    pub bottom: f64,
}

impl RacketSpan {
    pub fn new(top: f64, height: f64) -> Self {
        RacketSpan {
            top,
            bottom: top + height,
        }
    }

    /// Vertical center of the racket.
    pub fn center(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }
}

/// The ball as the local simulation sees it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BallState {
    pub position: BallPosition,
    pub velocity: BallVelocity,
    /// The ball is live and collides. False once it left for the opponent or got lost.
    pub bounce: bool,
}

/// Things that happened during one integration step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SideEffect {
    /// The local racket returned the ball.
    BallHit,
    /// The ball bounced off the top or bottom wall.
    BallBounce,
    /// The ball passed the local racket.
    BallLost,
    /// The ball left the local court towards the opponent.
    Handoff {
        position: BallPosition,
        velocity: BallVelocity,
    },
}

/// Result of [`advance`].
#[derive(Clone, Debug, PartialEq)]
pub struct Advance {
    pub ball: BallState,
    /// In the order they occurred. A racket hit can be followed by a wall bounce.
    pub side_effects: Vec<SideEffect>,
}

/// Source of the random vertical deviation applied on a racket hit.
pub trait DeviationSource {
    /// A uniform draw in [-1, 1].
    fn next_deviation(&mut self) -> f64;
}

/// Draws deviations from any [`rand::Rng`]. Seed it for reproducible rallies.
pub struct RngDeviation<R>(pub R);

impl<R: Rng> DeviationSource for RngDeviation<R> {
    fn next_deviation(&mut self) -> f64 {
        self.0.random_range(-1.0..=1.0)
    }
}

/// Always returns the same draw.
#[derive(Clone, Copy, Debug)]
pub struct FixedDeviation(pub f64);

impl DeviationSource for FixedDeviation {
    fn next_deviation(&mut self) -> f64 {
        self.0
    }
}

/// Integrates the ball over `elapsed_ms` and resolves racket, mid-court and wall contacts.
pub fn advance(
    ball: &BallState,
    elapsed_ms: f64,
    constraints: &BallConstraints,
    is_left_player: bool,
    racket: RacketSpan,
    config: &GameConfig,
    deviation: &mut impl DeviationSource,
) -> Advance {
    debug_assert!(
        ball.velocity.is_finite(),
        "Ball velocity must be finite: {:?}",
        ball.velocity
    );
    let mut velocity = ball.velocity;
    let mut new_top = ball.position.top + config.base_velocity * velocity.y * elapsed_ms / 1000.0;
    let new_left = ball.position.left + config.base_velocity * velocity.x * elapsed_ms / 1000.0;
    let new_bottom = new_top + constraints.size;

    // A ball in flight to the opponent or a lost ball only drifts.
    if !ball.bounce {
        return Advance {
            ball: BallState {
                position: BallPosition {
                    top: new_top,
                    left: new_left,
                },
                velocity,
                bounce: false,
            },
            side_effects: Vec::new(),
        };
    }

    let entering_racket_edge = (is_left_player && new_left < constraints.min_left)
        || (!is_left_player && new_left > constraints.max_left);
    let entering_mid_court_edge = (is_left_player && new_left > constraints.max_left)
        || (!is_left_player && new_left < constraints.min_left);

    let mut side_effects = Vec::with_capacity(2);

    if entering_racket_edge {
        let margin = config.ball_racket_margin_px;
        if new_top < racket.top - margin || new_bottom > racket.bottom + margin {
            side_effects.push(SideEffect::BallLost);
            return Advance {
                ball: BallState {
                    position: BallPosition {
                        top: new_top,
                        left: new_left,
                    },
                    velocity,
                    bounce: false,
                },
                side_effects,
            };
        }
        side_effects.push(SideEffect::BallHit);
        let shift = deviation.next_deviation() * config.racket_deviation_coefficient;
        let limit = config.max_vertical_velocity;
        velocity.y = (velocity.y + shift).clamp(-limit, limit);
        velocity.x = -velocity.x.signum() * (1.0 - velocity.y * velocity.y).sqrt();
    } else if entering_mid_court_edge {
        let position = BallPosition {
            top: new_top,
            left: new_left,
        };
        side_effects.push(SideEffect::Handoff { position, velocity });
        return Advance {
            ball: BallState {
                position,
                velocity,
                bounce: false,
            },
            side_effects,
        };
    }

    if new_top < constraints.min_top {
        side_effects.push(SideEffect::BallBounce);
        new_top = constraints.min_top;
        velocity.y = -velocity.y;
    } else if new_top > constraints.max_top {
        side_effects.push(SideEffect::BallBounce);
        new_top = constraints.max_top;
        velocity.y = -velocity.y;
    }

    Advance {
        ball: BallState {
            position: BallPosition {
                top: new_top,
                left: new_left,
            },
            velocity,
            bounce: true,
        },
        side_effects,
    }
}
