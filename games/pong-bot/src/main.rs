//! Headless pong client. Connects to the relay, registers a name, joins a match and plays it
//! to the end with an automatic racket.

mod autopilot;

use crate::autopilot::Autopilot;
use clap::Parser;
use rally_core::match_session::SessionEvent;
use rally_core::rally::RallyEvent;
use rally_core::web_socket_interface::WebSocketRelay;
use rally_core::{GameConfig, MatchSession, RngDeviation, Viewport};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pong-bot", version, about = "Plays a pong match over a relay server")]
struct Cli {
    #[arg(long, env = "RELAY_URL", default_value = "ws://127.0.0.1:5001/ws")]
    url: String,
    #[arg(long, default_value = "pong-bot")]
    name: String,
    #[arg(long, default_value = "lobby")]
    match_id: String,
    /// JSON file with game config overrides.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 1280.0)]
    width: f64,
    #[arg(long, default_value_t = 720.0)]
    height: f64,
    /// Racket speed in pixels per second.
    #[arg(long, default_value_t = 900.0)]
    racket_speed: f64,
    /// Seeds the racket deviation and the serve angles.
    #[arg(long)]
    seed: Option<u64>,
}

/// Pause between two heartbeats.
const FRAME: Duration = Duration::from_millis(10);
/// Seconds the bot holds the ball before serving.
const SERVE_DELAY: f32 = 1.0;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=debug,rally_core=debug", env!("CARGO_CRATE_NAME")).into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true),
        )
        .init();

    let cli = Cli::parse();
    if !(cli.width > 0.0 && cli.height > 0.0) {
        return Err(format!("invalid viewport {}x{}", cli.width, cli.height).into());
    }
    if cli.racket_speed.is_nan() || cli.racket_speed < 0.0 {
        return Err(format!("invalid racket speed {}", cli.racket_speed).into());
    }
    let config = match &cli.config {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };

    let seed = cli.seed.unwrap_or_else(|| rand::rng().random());
    info!(seed, "Seeding the bot.");
    let mut autopilot = Autopilot::new(
        StdRng::seed_from_u64(seed.wrapping_add(1)),
        cli.racket_speed,
        config.min_shooting_angle,
        SERVE_DELAY,
    );

    let relay = WebSocketRelay::connect(&cli.url)?;
    let mut session = MatchSession::new(
        relay,
        config,
        Viewport {
            width: cli.width,
            height: cli.height,
        },
        RngDeviation(StdRng::seed_from_u64(seed)),
    );

    let mut last_frame = Instant::now();
    loop {
        let now = Instant::now();
        let delta_time = (now - last_frame).as_secs_f32();
        last_frame = now;

        session.update(delta_time);
        while let Some(event) = session.next_event() {
            match event {
                SessionEvent::Connected => {
                    session.set_name(cli.name.as_str())?;
                }
                SessionEvent::NameRegistered(name) => {
                    info!(%name, "Name registered.");
                    session.join_match(cli.match_id.as_str())?;
                }
                SessionEvent::MatchJoined(match_id) => info!(%match_id, "Joined, waiting for the match."),
                SessionEvent::WaitingForOpponent => info!("Waiting for an opponent."),
                SessionEvent::MatchStarted {
                    opponent_name,
                    is_left_player,
                    max_score,
                } => info!(%opponent_name, is_left_player, max_score, "Match started."),
                SessionEvent::Rally(RallyEvent::RoundEnded { won, score }) => info!(
                    won,
                    own = score.own,
                    opponent = score.opponent,
                    "Point finished."
                ),
                SessionEvent::Rally(rally_event) => debug!(?rally_event),
                SessionEvent::MatchFinished(result) => info!(
                    won = result.won,
                    own = result.score.own,
                    opponent = result.score.opponent,
                    "Match finished."
                ),
                SessionEvent::MatchLeft => {
                    info!("Left the match, bye.");
                    return Ok(());
                }
                SessionEvent::OpponentDisconnected => {
                    warn!("Opponent left the match.");
                    return Ok(());
                }
                SessionEvent::Disconnected { reason } => {
                    return Err(format!("lost connection to relay: {reason}").into());
                }
                SessionEvent::RequestFailed {
                    request_id,
                    kind,
                    error,
                } => {
                    error!(request_id, ?kind, %error, "Request failed.");
                    return Err(error.into());
                }
                SessionEvent::MatchList(_) => {}
            }
        }

        autopilot.drive(&mut session, delta_time);
        std::thread::sleep(FRAME);
    }
}
