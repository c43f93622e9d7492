//! Shared handle to the current game and its tick worker.
//!
//! [`GameService`] is what the UI and the network layer talk to. It keeps the
//! current [`GameState`] behind a lock, forwards network messages into the
//! game's inbox and drives `tick()` at a fixed rate.

use crate::events::{GameEvent, UiEvent};
use crate::game::{GameState, GameView, InputHandle, Role};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{Message, PeerAddress};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

pub struct GameService {
    my_id: PeerAddress,
    tick_rate: u32,
    seed: Option<u64>,
    games: AtomicU64,
    is_host: AtomicBool,
    inputs: InputHandle,
    state: Mutex<Option<GameState>>,
    inbox: std::sync::Mutex<Option<mpsc::UnboundedSender<Message>>>,
    events: mpsc::UnboundedSender<GameEvent>,
    ui: mpsc::UnboundedSender<UiEvent>,
    ticker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl GameService {
    /// Creates the service together with the stream of events its games emit.
    pub fn new(
        my_id: PeerAddress,
        tick_rate: u32,
        seed: Option<u64>,
        ui: mpsc::UnboundedSender<UiEvent>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<GameEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let service = Arc::new(Self {
            my_id,
            tick_rate: tick_rate.max(1),
            seed,
            games: AtomicU64::new(0),
            is_host: AtomicBool::new(false),
            inputs: InputHandle::default(),
            state: Mutex::new(None),
            inbox: std::sync::Mutex::new(None),
            events,
            ui,
            ticker: std::sync::Mutex::new(None),
        });
        (service, events_rx)
    }

    pub fn id(&self) -> &PeerAddress {
        &self.my_id
    }

    pub fn is_host(&self) -> bool {
        self.is_host.load(Ordering::Acquire)
    }

    pub fn set_host(&self, is_host: bool) {
        self.is_host.store(is_host, Ordering::Release);
    }

    /// Handle for registering player input intents.
    pub fn inputs(&self) -> InputHandle {
        self.inputs.clone()
    }

    /// Replaces the current game with a fresh one.
    pub async fn init_new_game(&self, multiplayer: bool, player_number: u32, player_count: u32) {
        let role = match (multiplayer, self.is_host()) {
            (false, _) => Role::Solo,
            (true, true) => Role::Host,
            (true, false) => Role::Client,
        };
        let game = self.games.fetch_add(1, Ordering::Relaxed);
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(game)),
            None => StdRng::from_entropy(),
        };

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;
        *self.inbox.lock().unwrap_or_else(|e| e.into_inner()) = Some(inbox_tx);
        *state = Some(GameState::new(
            self.my_id.clone(),
            role,
            player_number,
            player_count,
            rng,
            self.inputs.clone(),
            inbox_rx,
            self.events.clone(),
        ));
    }

    /// Queues a network message for the next tick.
    pub fn deliver(&self, message: Message) {
        let inbox = self.inbox.lock().unwrap_or_else(|e| e.into_inner());
        let queued = inbox
            .as_ref()
            .map(|tx| tx.send(message).is_ok())
            .unwrap_or(false);
        if !queued {
            debug!("No game running, dropping message");
        }
    }

    /// Runs one tick. Returns `false` once there is no running game.
    pub async fn tick(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.as_mut() {
            Some(game) if !game.is_game_over() => {
                game.tick();
                !game.is_game_over()
            }
            _ => false,
        }
    }

    /// Pauses or resumes on behalf of the local player.
    pub async fn set_paused(&self, paused: bool) {
        if let Some(game) = self.state.lock().await.as_mut() {
            game.set_paused(paused);
        }
    }

    /// Another player paused the game.
    pub async fn handle_incoming_pause(&self) {
        if let Some(game) = self.state.lock().await.as_mut() {
            game.set_paused_silently(true);
        }
        let _ = self.ui.send(UiEvent::PauseRequested);
    }

    /// Another player resumed the game.
    pub async fn handle_incoming_resume(&self) {
        if let Some(game) = self.state.lock().await.as_mut() {
            game.set_paused_silently(false);
        }
        let _ = self.ui.send(UiEvent::ResumeRequested);
    }

    /// Resumes without telling anyone, used when the network goes away.
    pub async fn unpause_silently(&self) {
        if let Some(game) = self.state.lock().await.as_mut() {
            game.set_paused_silently(false);
        }
    }

    pub async fn points(&self) -> u32 {
        self.state.lock().await.as_ref().map(|g| g.points()).unwrap_or(0)
    }

    pub async fn is_game_over(&self) -> bool {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|g| g.is_game_over())
            .unwrap_or(false)
    }

    pub async fn is_paused(&self) -> bool {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|g| g.is_paused())
            .unwrap_or(false)
    }

    pub async fn view(&self) -> Option<GameView> {
        self.state.lock().await.as_ref().map(|g| g.view())
    }

    /// Runs `f` against the current game, if any.
    pub async fn with_state<R>(&self, f: impl FnOnce(&mut GameState) -> R) -> Option<R> {
        self.state.lock().await.as_mut().map(f)
    }

    /// Starts the fixed-rate tick worker. Ticks are skipped while paused; the
    /// worker ends with a [`UiEvent::GameOver`] once the game is over.
    pub fn start_ticking(self: &Arc<Self>) {
        let mut ticker = self.ticker.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = ticker.take() {
            previous.abort();
        }
        let service = Arc::downgrade(self);
        let period = Duration::from_secs_f64(1.0 / self.tick_rate as f64);
        *ticker = Some(tokio::spawn(run_ticker(service, period)));
        info!("Ticking at {} Hz", self.tick_rate);
    }

    pub fn stop_ticking(&self) {
        if let Some(ticker) = self
            .ticker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            ticker.abort();
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|ticker| !ticker.is_finished())
            .unwrap_or(false)
    }
}

async fn run_ticker(service: Weak<GameService>, period: Duration) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        timer.tick().await;
        let Some(service) = service.upgrade() else {
            break;
        };
        let mut state = service.state.lock().await;
        let Some(game) = state.as_mut() else {
            continue;
        };
        if !game.is_game_over() {
            if game.is_paused() {
                continue;
            }
            game.tick();
            if !game.is_game_over() {
                continue;
            }
        }
        info!("Game over with {} points", game.points());
        drop(state);
        if service.ui.send(UiEvent::GameOver).is_err() {
            warn!("UI listener is gone");
        }
        break;
    }
}
