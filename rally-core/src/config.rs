//! Tunables of the game and the playfield geometry derived from the viewport.
//!
//! All sizes are relative to the viewport, so two clients with different screens play on
//! the same logical court. The [`PlayfieldLayout`] has to be recomputed whenever the viewport resizes.

use crate::error::ConfigError;
use crate::physics::BallConstraints;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The game configuration. Every field has a default, so a config file only needs the overrides.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    /// Racket width relative to the viewport width.
    pub racket_width_ratio: f64,
    /// Racket height relative to the viewport height.
    pub racket_height_ratio: f64,
    /// Ball size relative to the viewport width.
    pub ball_size_ratio: f64,
    /// Gap between racket and screen border relative to the viewport width.
    pub padding_right_ratio: f64,
    /// Pixels per second the ball travels with a unit velocity.
    pub base_velocity: f64,
    /// Width of the drag area relative to the viewport width.
    pub racket_scroll_width_ratio: f64,
    /// Tolerance around the racket that still counts as a hit.
    pub ball_racket_margin_px: f64,
    /// Maximum random change of the vertical velocity on a racket hit.
    pub racket_deviation_coefficient: f64,
    /// The vertical velocity after a racket hit is clamped to this magnitude.
    pub max_vertical_velocity: f64,
    /// Minimum |dx/dy| of a throw gesture.
    pub min_shooting_angle: f64,
    /// Period of the simulation clock.
    pub tick_period_ms: f64,
    /// Time the loss animation gets before the point is booked.
    pub loss_settle_ms: f64,
    /// Time we wait for the relay to acknowledge a request.
    pub ack_timeout_secs: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            racket_width_ratio: 0.02,
            racket_height_ratio: 0.15,
            ball_size_ratio: 0.03,
            padding_right_ratio: 0.01,
            base_velocity: 1000.0,
            racket_scroll_width_ratio: 0.35,
            ball_racket_margin_px: 20.0,
            racket_deviation_coefficient: 0.2,
            max_vertical_velocity: 0.9,
            min_shooting_angle: 0.5,
            tick_period_ms: 10.0,
            loss_settle_ms: 500.0,
            ack_timeout_secs: 5.0,
        }
    }
}

impl GameConfig {
    /// Reads a JSON config file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json_content = std::fs::read_to_string(path)?;
        Self::from_json(&json_content)
    }

    /// Parses and validates a JSON config.
    pub fn from_json(json_content: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values the simulation relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("racket_width_ratio", self.racket_width_ratio),
            ("racket_height_ratio", self.racket_height_ratio),
            ("ball_size_ratio", self.ball_size_ratio),
            ("base_velocity", self.base_velocity),
            ("racket_scroll_width_ratio", self.racket_scroll_width_ratio),
            ("tick_period_ms", self.tick_period_ms),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be positive, got {value}"),
                });
            }
        }
        let non_negative = [
            ("padding_right_ratio", self.padding_right_ratio),
            ("ball_racket_margin_px", self.ball_racket_margin_px),
            ("racket_deviation_coefficient", self.racket_deviation_coefficient),
            ("min_shooting_angle", self.min_shooting_angle),
            ("loss_settle_ms", self.loss_settle_ms),
        ];
        for (field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must not be negative, got {value}"),
                });
            }
        }
        if !(self.max_vertical_velocity > 0.0 && self.max_vertical_velocity < 1.0) {
            return Err(ConfigError::Invalid {
                field: "max_vertical_velocity",
                reason: format!("must be in (0, 1), got {}", self.max_vertical_velocity),
            });
        }
        if !(self.ack_timeout_secs.is_finite() && self.ack_timeout_secs > 0.0) {
            return Err(ConfigError::Invalid {
                field: "ack_timeout_secs",
                reason: format!("must be positive, got {}", self.ack_timeout_secs),
            });
        }
        Ok(())
    }
}

/// Size of the local screen in pixels.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// Everything about the court that depends on the viewport.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayfieldLayout {
    pub viewport: Viewport,
    pub racket_width: f64,
    pub racket_height: f64,
    pub ball_size: f64,
    pub min_racket_top: f64,
    pub max_racket_top: f64,
    pub padding_right: f64,
    pub racket_scroll_width: f64,
    pub ball_space_width: f64,
    pub ball_constraints: BallConstraints,
}

impl PlayfieldLayout {
    pub fn compute(config: &GameConfig, viewport: Viewport) -> Self {
        let racket_width = config.racket_width_ratio * viewport.width;
        let racket_height = config.racket_height_ratio * viewport.height;
        let ball_size = config.ball_size_ratio * viewport.width;
        let padding_right = config.padding_right_ratio * viewport.width;
        let ball_space_width = viewport.width - racket_width - padding_right;

        PlayfieldLayout {
            viewport,
            racket_width,
            racket_height,
            ball_size,
            min_racket_top: 0.0,
            max_racket_top: viewport.height - racket_height,
            padding_right,
            racket_scroll_width: config.racket_scroll_width_ratio * viewport.width,
            ball_space_width,
            ball_constraints: BallConstraints {
                min_top: 0.0,
                max_top: viewport.height - ball_size,
                min_left: 0.0,
                max_left: ball_space_width - ball_size,
                size: ball_size,
            },
        }
    }

    /// The racket position in the middle of its travel.
    pub fn centered_racket_top(&self) -> f64 {
        (self.min_racket_top + self.max_racket_top) / 2.0
    }

    pub fn clamp_racket_top(&self, top: f64) -> f64 {
        top.min(self.max_racket_top).max(self.min_racket_top)
    }
}
