//! Turns press -> drag -> release gestures into racket moves and serves.
//!
//! Every drag move repositions the racket by the vertical distance since the last move.
//! A release is a throw if the controller is enabled, the gesture points towards the opponent
//! and it is flat enough (`|dx / dy|` above the minimum shooting angle). The velocity of the
//! throw is the normalized gesture vector.

use protocol::BallVelocity;
use tracing::warn;

/// What the gesture asks for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControllerOutput {
    /// The new (already clamped) top of the local racket.
    RacketMoved(f64),
    /// A valid throw with a unit length velocity.
    ServeRequested(BallVelocity),
}

#[derive(Clone, Copy, Debug)]
struct Gesture {
    start_x: f64,
    start_y: f64,
    /// Y of the last move event, the next racket move is relative to it.
    last_y: f64,
}

pub struct ThrowController {
    is_left_player: bool,
    min_shooting_angle: f64,
    gesture: Option<Gesture>,
}

impl ThrowController {
    pub fn new(is_left_player: bool, min_shooting_angle: f64) -> Self {
        ThrowController {
            is_left_player,
            min_shooting_angle,
            gesture: None,
        }
    }

    /// Pointer down. Starts a new gesture, a running one gets replaced.
    pub fn press(&mut self, x: f64, y: f64) {
        if !(x.is_finite() && y.is_finite()) {
            warn!(x, y, "Ignoring press with invalid coordinates.");
            return;
        }
        self.gesture = Some(Gesture {
            start_x: x,
            start_y: y,
            last_y: y,
        });
    }

    /// Pointer move while pressed. Returns the new racket top, clamped to the racket travel.
    pub fn drag(
        &mut self,
        y: f64,
        racket_top: f64,
        min_racket_top: f64,
        max_racket_top: f64,
    ) -> Option<ControllerOutput> {
        let gesture = self.gesture.as_mut()?;
        if !y.is_finite() {
            warn!(y, "Ignoring drag with invalid coordinate.");
            return None;
        }
        let new_top = (racket_top + y - gesture.last_y)
            .min(max_racket_top)
            .max(min_racket_top);
        gesture.last_y = y;
        Some(ControllerOutput::RacketMoved(new_top))
    }

    /// Pointer released. `enabled` is false while a rally runs or the ball is away.
    pub fn release(&mut self, x: f64, y: f64, enabled: bool) -> Option<ControllerOutput> {
        let gesture = self.gesture.take()?;
        if !enabled || !(x.is_finite() && y.is_finite()) {
            return None;
        }
        let dx = x - gesture.start_x;
        let dy = y - gesture.start_y;

        let towards_opponent = (self.is_left_player && dx > 0.0) || (!self.is_left_player && dx < 0.0);
        // A vertical distance of zero yields an infinite ratio, which is as flat as it gets.
        if !towards_opponent || (dx / dy).abs() <= self.min_shooting_angle {
            return None;
        }

        let length = (dx * dx + dy * dy).sqrt();
        Some(ControllerOutput::ServeRequested(BallVelocity {
            x: dx / length,
            y: dy / length,
        }))
    }

    /// Pointer up without throwing (mouse up, touch cancel).
    pub fn cancel(&mut self) {
        self.gesture = None;
    }
}
