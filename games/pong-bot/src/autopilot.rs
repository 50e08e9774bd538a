//! Plays like a person with a pointer: serves with a throw gesture and drags the racket
//! towards the ball with a limited speed.

use rally_core::{DeviationSource, MatchSession, RelayClient};
use rand::Rng;

/// What to do this frame, decided on a read only view of the session.
enum Plan {
    Idle,
    Serve { x: f64, y: f64, dx: f64, dy: f64 },
    Drag { x: f64, y: f64, step: f64 },
}

pub struct Autopilot<R: Rng> {
    rng: R,
    /// Pixels per second the racket may travel.
    racket_speed: f64,
    /// Steepest serve slope that still passes the shooting angle check.
    max_serve_slope: f64,
    serve_delay: f32,
    waited: f32,
}

impl<R: Rng> Autopilot<R> {
    pub fn new(rng: R, racket_speed: f64, min_shooting_angle: f64, serve_delay: f32) -> Self {
        Autopilot {
            rng,
            racket_speed,
            max_serve_slope: 0.9 / min_shooting_angle.max(0.1),
            serve_delay,
            waited: 0.0,
        }
    }

    /// Feeds the pointer gestures for this frame into the session.
    pub fn drive<C: RelayClient, D: DeviationSource>(
        &mut self,
        session: &mut MatchSession<C, D>,
        delta_time: f32,
    ) {
        match self.plan(session, delta_time) {
            Plan::Idle => {}
            Plan::Serve { x, y, dx, dy } => {
                session.pointer_down(x, y);
                session.pointer_up(x + dx, y + dy);
            }
            Plan::Drag { x, y, step } => {
                session.pointer_down(x, y);
                session.pointer_move(y + step);
                session.pointer_cancel();
            }
        }
    }

    fn plan<C: RelayClient, D: DeviationSource>(
        &mut self,
        session: &MatchSession<C, D>,
        delta_time: f32,
    ) -> Plan {
        let Some(active) = session.active_match() else {
            self.waited = 0.0;
            return Plan::Idle;
        };
        let rally = active.rally();
        let layout = rally.layout();
        let x = if rally.is_left_player() {
            layout.racket_scroll_width / 2.0
        } else {
            layout.viewport.width - layout.racket_scroll_width / 2.0
        };
        let y = layout.viewport.height / 2.0;

        if rally.can_serve() {
            self.waited += delta_time;
            if self.waited < self.serve_delay {
                return Plan::Idle;
            }
            self.waited = 0.0;
            let dx = if rally.is_left_player() { 100.0 } else { -100.0 };
            let slope = self
                .rng
                .random_range(-self.max_serve_slope..=self.max_serve_slope);
            return Plan::Serve {
                x,
                y,
                dx,
                dy: slope * 100.0,
            };
        }
        self.waited = 0.0;

        if !rally.ball_visible() {
            return Plan::Idle;
        }
        let target =
            rally.ball().position.top + layout.ball_size / 2.0 - layout.racket_height / 2.0;
        let max_step = self.racket_speed * delta_time as f64;
        let step = (target - rally.racket_top()).clamp(-max_step, max_step);
        if step.abs() < 0.5 {
            return Plan::Idle;
        }
        Plan::Drag { x, y, step }
    }
}
