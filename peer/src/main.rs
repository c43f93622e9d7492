use clap::Parser;
use log::{error, info, warn};
use peer::config::Args;
use peer::{Coordinator, GameService, InputHandle, Mode, PeerConfig, StaticDiscovery, UiEvent};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Runs a headless host, client or single player game.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = PeerConfig::try_from(Args::parse())?;
    info!(
        "Starting {:?} peer '{}' as {}",
        config.mode, config.local.name, config.local.address
    );

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let (game, game_events) = GameService::new(
        config.local.address.clone(),
        config.tick_rate,
        config.seed,
        ui_tx.clone(),
    );
    let discovery = Arc::new(StaticDiscovery::new(config.known_peers.clone()));
    let coordinator = Coordinator::new(&config, Arc::clone(&game), game_events, discovery, ui_tx);

    match config.mode {
        Mode::Solo => {
            game.init_new_game(false, 0, 1).await;
            game.start_ticking();
        }
        Mode::Host => {
            let addr = coordinator.start_hosting().await?;
            info!("Waiting for {} players on {}", config.players - 1, addr);
            if config.players <= 1 {
                coordinator.start_game().await;
                game.start_ticking();
            }
        }
        Mode::Join => {
            if let Some(host) = config.connect.clone() {
                coordinator.connect_to(host).await;
            }
        }
    }

    let inputs = game.inputs();
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut autoplay = interval(Duration::from_millis(150));
    autoplay.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status = interval(Duration::from_secs(5));
    status.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = ui_rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                if !handle_ui_event(&config, &coordinator, &game, event).await {
                    break;
                }
            }
            _ = autoplay.tick(), if config.autoplay => press_random_key(&inputs, &mut rng),
            _ = status.tick() => {
                if let Some(view) = game.view().await {
                    info!(
                        "{} points, {} rows, tower {} high{}",
                        view.points,
                        view.rows,
                        view.wall.highest_tower(),
                        if view.paused { " (paused)" } else { "" }
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    game.stop_ticking();
    coordinator.stop_all().await;
    if let Some(view) = game.view().await {
        info!("Final score: {} points, {} rows", view.points, view.rows);
    }
    Ok(())
}

/// Reacts to one notification. Returns `false` when the peer should exit.
async fn handle_ui_event(
    config: &PeerConfig,
    coordinator: &Arc<Coordinator>,
    game: &Arc<GameService>,
    event: UiEvent,
) -> bool {
    match event {
        UiEvent::StateChanged(state) => info!("Connection state: {}", state),
        UiEvent::PeerDiscovered(peer) => {
            info!("Found {} at {}", peer.name, peer.address);
            let joined = coordinator.peers().await.len() as u32 + 1;
            if config.mode == Mode::Host && joined >= config.players && game.view().await.is_none()
            {
                coordinator.start_game().await;
                game.start_ticking();
            }
        }
        UiEvent::ServerConnected(host) => info!("Joined {} at {}", host.name, host.address),
        UiEvent::PeerLost(peer) => {
            warn!("Lost {} at {}", peer.name, peer.address);
            return false;
        }
        UiEvent::DiscoveryFinished => info!("Discovery finished"),
        UiEvent::Toast(text) => warn!("{}", text),
        UiEvent::ConnectFailed(address) => {
            error!("CONNECTION FAILED: {}", address);
            return false;
        }
        UiEvent::StartGame {
            player_number,
            player_count,
        } => {
            info!("Starting as player {} of {}", player_number, player_count);
            game.init_new_game(true, player_number, player_count).await;
            game.start_ticking();
        }
        UiEvent::PauseRequested => info!("Another player paused the game"),
        UiEvent::ResumeRequested => info!("Another player resumed the game"),
        UiEvent::GameOver => {
            info!("Game over");
            return false;
        }
    }
    true
}

fn press_random_key<R: Rng>(inputs: &InputHandle, rng: &mut R) {
    match rng.gen_range(0..8) {
        0 | 1 => inputs.move_left(),
        2 | 3 => inputs.move_right(),
        4 | 5 => inputs.rotate(),
        6 => inputs.speed_up(),
        _ => inputs.slow_down(),
    }
}
