//! The falling-block simulation of one peer.
//!
//! On the host (and in single player) [`GameState`] is authoritative: it docks
//! every shape, owns the wall and the score. On a client it only moves the
//! local shape and replaces its wall with whatever the host sends.

use crate::events::GameEvent;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use shared::{
    Message, MessageBody, Motion, PeerAddress, Score, Shape, ShapeSnapshot, ShapeType, Speed,
    Wall, COLS, TICK_RATE,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Which part this peer plays in the current game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Solo,
    Host,
    Client,
}

#[derive(Debug, Default)]
struct InputFlags {
    left: AtomicBool,
    right: AtomicBool,
    rotate: AtomicBool,
    speed_up: AtomicBool,
    slow_down: AtomicBool,
}

/// Player input intents. Each call raises a one-shot flag that the next tick
/// consumes.
#[derive(Debug, Clone, Default)]
pub struct InputHandle(Arc<InputFlags>);

impl InputHandle {
    pub fn move_left(&self) {
        self.0.left.store(true, Ordering::Release);
    }

    pub fn move_right(&self) {
        self.0.right.store(true, Ordering::Release);
    }

    pub fn rotate(&self) {
        self.0.rotate.store(true, Ordering::Release);
    }

    pub fn speed_up(&self) {
        self.0.speed_up.store(true, Ordering::Release);
    }

    pub fn slow_down(&self) {
        self.0.slow_down.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        for flag in self.flags() {
            flag.store(false, Ordering::Release);
        }
    }

    fn flags(&self) -> [&AtomicBool; 5] {
        [
            &self.0.left,
            &self.0.right,
            &self.0.rotate,
            &self.0.speed_up,
            &self.0.slow_down,
        ]
    }

    fn take(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::AcqRel)
    }
}

/// Read-only copy of a game for drawing and queries.
#[derive(Debug, Clone, PartialEq)]
pub struct GameView {
    pub wall: Wall,
    pub my_shape: ShapeSnapshot,
    pub other_shapes: Vec<(PeerAddress, ShapeSnapshot)>,
    pub points: u32,
    pub rows: u32,
    pub paused: bool,
    pub game_over: bool,
    pub role: Role,
    pub player_number: u32,
    pub player_count: u32,
}

pub struct GameState {
    my_id: PeerAddress,
    role: Role,
    player_number: u32,
    player_count: u32,
    my_shape: Shape,
    other_shapes: HashMap<PeerAddress, Shape>,
    wall: Wall,
    score: Score,
    paused: bool,
    game_over: bool,
    ticks: u32,
    rng: StdRng,
    inputs: InputHandle,
    inbox: mpsc::UnboundedReceiver<Message>,
    events: Option<mpsc::UnboundedSender<GameEvent>>,
}

impl GameState {
    /// Creates a game and spawns the first shape. `events` is only used when
    /// the game is multiplayer.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        my_id: PeerAddress,
        role: Role,
        player_number: u32,
        player_count: u32,
        rng: StdRng,
        inputs: InputHandle,
        inbox: mpsc::UnboundedReceiver<Message>,
        events: mpsc::UnboundedSender<GameEvent>,
    ) -> Self {
        let mut state = Self {
            my_id,
            role,
            player_number,
            player_count: player_count.max(1),
            my_shape: Shape::new(ShapeType::O, 0, 0),
            other_shapes: HashMap::new(),
            wall: Wall::new(),
            score: Score::new(),
            paused: false,
            game_over: false,
            ticks: 0,
            rng,
            inputs,
            inbox,
            events: (role != Role::Solo).then_some(events),
        };
        state.inputs.clear();
        state.respawn();
        info!(
            "New {:?} game as player {} of {}",
            state.role, state.player_number, state.player_count
        );
        state
    }

    /// Advances the game by one step.
    pub fn tick(&mut self) {
        if self.game_over {
            return;
        }
        self.ticks = self.ticks.wrapping_add(1);
        if self.is_multiplayer() {
            self.drain_inbox();
        }
        if self.game_over {
            return;
        }
        match self.role {
            Role::Solo | Role::Host => self.server_tick(),
            Role::Client => self.client_tick(),
        }
    }

    fn server_tick(&mut self) {
        self.handle_inputs();
        if self.wall.is_shape_docked(&self.my_shape) {
            let shape = self.my_shape.clone();
            let me = self.my_id.clone();
            self.dock(&shape, me);
        }
        self.update_my_shape();

        if self.is_multiplayer() {
            let docked: Vec<PeerAddress> = self
                .other_shapes
                .iter()
                .filter(|(_, shape)| self.wall.is_shape_docked(shape))
                .map(|(id, _)| id.clone())
                .collect();
            for id in docked {
                if let Some(shape) = self.other_shapes.remove(&id) {
                    self.dock(&shape, id);
                }
            }
        }
    }

    fn client_tick(&mut self) {
        self.handle_inputs();
        self.update_my_shape();
    }

    fn drain_inbox(&mut self) {
        while let Ok(message) = self.inbox.try_recv() {
            self.handle_message(message);
        }
    }

    /// Applies a message received from another peer.
    pub fn handle_message(&mut self, message: Message) {
        let Message { origin, body } = message;
        match body {
            MessageBody::Shape(snapshot) => {
                if origin == self.my_id {
                    return;
                }
                match Shape::try_from(snapshot) {
                    Ok(shape) => {
                        self.other_shapes.insert(origin, shape);
                    }
                    Err(e) => warn!("Ignoring shape from {}: {}", origin, e),
                }
            }
            MessageBody::Wall(snapshot) => {
                if self.role == Role::Host {
                    return;
                }
                match Wall::try_from(snapshot) {
                    Ok(wall) => {
                        self.wall = wall;
                        if origin == self.my_id {
                            self.respawn();
                        }
                    }
                    Err(e) => warn!("Ignoring wall from {}: {}", origin, e),
                }
            }
            MessageBody::Points(points) => self.score.set_points(points),
            MessageBody::GameOver(over) => {
                if over && !self.game_over {
                    info!("Game over announced by {}", origin);
                }
                self.game_over = over;
            }
            MessageBody::PauseGame => self.paused = true,
            MessageBody::ResumeGame => self.paused = false,
            MessageBody::StartGame { .. } => {
                debug!("Ignoring start game from {} during a game", origin);
            }
        }
    }

    /// Merges `shape` into the wall on behalf of `docked_by`.
    fn dock(&mut self, shape: &Shape, docked_by: PeerAddress) {
        if !self.wall.put_shape(shape) {
            self.set_game_over();
        }
        let deleted = self.wall.check_rows();
        if deleted > 0 {
            debug!("Docking by {} cleared {} rows", docked_by, deleted);
        }
        if docked_by == self.my_id {
            self.respawn();
        }
        self.emit(GameEvent::WallChanged {
            docked_by,
            wall: self.wall.snapshot(),
        });
        if self.score.calculate(deleted) {
            self.emit(GameEvent::ScoreChanged(self.score.points()));
        }
    }

    /// Replaces the local shape with a fresh random one at the spawn column.
    fn respawn(&mut self) {
        let shape_type = ShapeType::random(&mut self.rng);
        let width = shape_type.layout(0)[0].len() as i32;
        let x = self.spawn_column().min(COLS as i32 - width).max(0);
        self.my_shape = Shape::new(shape_type, x, 0);

        let blocked = self
            .my_shape
            .cells()
            .any(|(col, row)| self.wall.is_occupied(col as usize, row as usize));
        if blocked {
            self.set_game_over();
        }
        self.emit(GameEvent::ShapeChanged(self.my_shape.snapshot()));
    }

    pub fn spawn_column(&self) -> i32 {
        match self.role {
            Role::Solo => (COLS / 2) as i32,
            Role::Host => 1,
            Role::Client => {
                (COLS as u32 / self.player_count * self.player_number) as i32 + 1
            }
        }
    }

    fn handle_inputs(&mut self) {
        let flags = &self.inputs.0;
        let left = InputHandle::take(&flags.left);
        let right = InputHandle::take(&flags.right);
        let rotate = InputHandle::take(&flags.rotate);
        let speed_up = InputHandle::take(&flags.speed_up);
        let slow_down = InputHandle::take(&flags.slow_down);

        if left {
            self.try_move(Motion::Left);
        }
        if right {
            self.try_move(Motion::Right);
        }
        if rotate {
            self.try_move(Motion::Rotate);
        }
        if speed_up {
            self.change_speed(Speed::Fast);
        }
        if slow_down {
            self.change_speed(Speed::Slow);
        }
    }

    fn try_move(&mut self, motion: Motion) -> bool {
        if self.collides(&self.my_shape, motion) {
            return false;
        }
        self.my_shape.apply(motion);
        self.emit(GameEvent::ShapeChanged(self.my_shape.snapshot()));
        true
    }

    fn change_speed(&mut self, speed: Speed) {
        if self.my_shape.speed() != speed.value() {
            self.my_shape.set_speed(speed.value());
            self.emit(GameEvent::ShapeChanged(self.my_shape.snapshot()));
        }
    }

    /// Lets the local shape fall one row whenever its speed says so.
    fn update_my_shape(&mut self) {
        let interval = ((TICK_RATE as f32 / self.my_shape.speed()) as u32).max(1);
        if self.ticks % interval == 0 {
            self.ticks = 0;
            self.try_move(Motion::Down);
        }
    }

    /// Whether `shape` after `motion` hits the wall or another player's shape.
    fn collides(&self, shape: &Shape, motion: Motion) -> bool {
        if self.wall.collides_with(shape, motion) {
            return true;
        }
        self.is_multiplayer()
            && self
                .other_shapes
                .values()
                .any(|other| shape.collides_with(other, motion))
    }

    fn set_game_over(&mut self) {
        if self.game_over {
            return;
        }
        info!("Game over with {} points", self.score.points());
        self.game_over = true;
        self.emit(GameEvent::GameOver);
    }

    fn emit(&self, event: GameEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                debug!("Game event listener is gone");
            }
        }
    }

    /// Pauses or resumes on behalf of the local player and tells the others.
    /// Nothing is sent when the flag already has that value.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        self.emit(GameEvent::PauseChanged(paused));
    }

    /// Pauses or resumes without telling anyone.
    pub fn set_paused_silently(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn view(&self) -> GameView {
        let mut other_shapes: Vec<(PeerAddress, ShapeSnapshot)> = self
            .other_shapes
            .iter()
            .map(|(id, shape)| (id.clone(), shape.snapshot()))
            .collect();
        other_shapes.sort_by(|a, b| a.0.cmp(&b.0));
        GameView {
            wall: self.wall.clone(),
            my_shape: self.my_shape.snapshot(),
            other_shapes,
            points: self.score.points(),
            rows: self.score.rows(),
            paused: self.paused,
            game_over: self.game_over,
            role: self.role,
            player_number: self.player_number,
            player_count: self.player_count,
        }
    }

    pub fn is_multiplayer(&self) -> bool {
        self.role != Role::Solo
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn points(&self) -> u32 {
        self.score.points()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn wall(&self) -> &Wall {
        &self.wall
    }

    /// Direct access to the wall, for scenario setup.
    pub fn wall_mut(&mut self) -> &mut Wall {
        &mut self.wall
    }

    pub fn my_shape(&self) -> &Shape {
        &self.my_shape
    }

    /// Replaces the local shape, for scenario setup.
    pub fn place_my_shape(&mut self, shape: Shape) {
        self.my_shape = shape;
    }

    pub fn other_shape(&self, id: &PeerAddress) -> Option<&Shape> {
        self.other_shapes.get(id)
    }
}
