//! Falling shapes: the seven shape types, their rotation layouts and motion.
//!
//! A [`Shape`] is plain data. Moving it never checks for collisions; callers
//! test a hypothetical motion first with [`Shape::moved`] (which works on a
//! copy) and only apply it in place once it is known to be free.

use crate::codec::WireError;
use crate::{COLS, ROWS};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Rows per second a freshly spawned shape falls.
pub const DEFAULT_SPEED: f32 = 2.0;

/// One rotation state of a shape: rows of cells, `true` where occupied.
pub type Layout = &'static [&'static [bool]];

const X: bool = true;
const E: bool = false;

static O_LAYOUTS: &[Layout] = &[&[&[X, X], &[X, X]]];

static T_LAYOUTS: &[Layout] = &[
    &[&[X, E], &[X, X], &[X, E]],
    &[&[X, X, X], &[E, X, E]],
    &[&[E, X], &[X, X], &[E, X]],
    &[&[E, X, E], &[X, X, X]],
];

static I_LAYOUTS: &[Layout] = &[&[&[X, X, X, X]], &[&[X], &[X], &[X], &[X]]];

static J_LAYOUTS: &[Layout] = &[
    &[&[X, X, X], &[E, E, X]],
    &[&[E, X], &[E, X], &[X, X]],
    &[&[X, E, E], &[X, X, X]],
    &[&[X, X], &[X, E], &[X, E]],
];

static L_LAYOUTS: &[Layout] = &[
    &[&[X, X, X], &[X, E, E]],
    &[&[X, X], &[E, X], &[E, X]],
    &[&[E, E, X], &[X, X, X]],
    &[&[X, E], &[X, E], &[X, X]],
];

static S_LAYOUTS: &[Layout] = &[&[&[E, X, X], &[X, X, E]], &[&[X, E], &[X, X], &[E, X]]];

static Z_LAYOUTS: &[Layout] = &[&[&[X, X, E], &[E, X, X]], &[&[E, X], &[X, X], &[X, E]]];

/// The seven shape types. Their ids (1..=7) double as wall cell values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeType {
    O,
    T,
    I,
    J,
    L,
    S,
    Z,
}

impl ShapeType {
    pub const ALL: [ShapeType; 7] = [
        ShapeType::O,
        ShapeType::T,
        ShapeType::I,
        ShapeType::J,
        ShapeType::L,
        ShapeType::S,
        ShapeType::Z,
    ];

    /// Cell value written into the wall when a shape of this type docks.
    pub fn id(self) -> u8 {
        match self {
            ShapeType::O => 1,
            ShapeType::T => 2,
            ShapeType::I => 3,
            ShapeType::J => 4,
            ShapeType::L => 5,
            ShapeType::S => 6,
            ShapeType::Z => 7,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|shape_type| shape_type.id() == id)
    }

    pub fn layouts(self) -> &'static [Layout] {
        match self {
            ShapeType::O => O_LAYOUTS,
            ShapeType::T => T_LAYOUTS,
            ShapeType::I => I_LAYOUTS,
            ShapeType::J => J_LAYOUTS,
            ShapeType::L => L_LAYOUTS,
            ShapeType::S => S_LAYOUTS,
            ShapeType::Z => Z_LAYOUTS,
        }
    }

    /// Layout for a rotation index, wrapping around the available states.
    pub fn layout(self, rotation: usize) -> Layout {
        let layouts = self.layouts();
        layouts[rotation % layouts.len()]
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

/// A hypothetical or real movement of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Left,
    Right,
    Rotate,
    Down,
}

/// Fall speeds selectable by the player, in rows per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Fast,
    Slow,
}

impl Speed {
    pub fn value(self) -> f32 {
        match self {
            Speed::Fast => 20.0,
            Speed::Slow => 2.0,
        }
    }
}

/// A falling shape positioned on the grid.
///
/// `x`/`y` address the top-left corner of the current layout in grid cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    x: i32,
    y: i32,
    shape_type: ShapeType,
    rotation: usize,
    speed: f32,
}

impl Shape {
    pub fn new(shape_type: ShapeType, x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            shape_type,
            rotation: 0,
            speed: DEFAULT_SPEED,
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R, x: i32, y: i32) -> Self {
        Self::new(ShapeType::random(rng), x, y)
    }

    /// Turns this shape into a fresh random one at the given position,
    /// resetting rotation and speed.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R, x: i32, y: i32) {
        *self = Self::random(rng, x, y);
    }

    pub fn move_left(&mut self) {
        self.x -= 1;
    }

    pub fn move_right(&mut self) {
        self.x += 1;
    }

    /// Rotates clockwise to the next layout.
    pub fn rotate(&mut self) {
        self.rotation = (self.rotation + 1) % self.shape_type.layouts().len();
    }

    /// Moves one row down.
    pub fn fall(&mut self) {
        self.y += 1;
    }

    pub fn apply(&mut self, motion: Motion) {
        match motion {
            Motion::Left => self.move_left(),
            Motion::Right => self.move_right(),
            Motion::Rotate => self.rotate(),
            Motion::Down => self.fall(),
        }
    }

    /// A copy of this shape with `motion` applied.
    pub fn moved(&self, motion: Motion) -> Shape {
        let mut copy = self.clone();
        copy.apply(motion);
        copy
    }

    /// Absolute `(col, row)` of every occupied cell.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.layout().iter().enumerate().flat_map(move |(row, cols)| {
            cols.iter()
                .enumerate()
                .filter(|(_, occupied)| **occupied)
                .map(move |(col, _)| (self.x + col as i32, self.y + row as i32))
        })
    }

    /// Whether this shape, after `motion`, would share a cell with `other`.
    pub fn collides_with(&self, other: &Shape, motion: Motion) -> bool {
        let moved = self.moved(motion);
        let hit = moved
            .cells()
            .any(|cell| other.cells().any(|other_cell| other_cell == cell));
        hit
    }

    pub fn layout(&self) -> Layout {
        self.shape_type.layout(self.rotation)
    }

    pub fn width(&self) -> i32 {
        self.layout()[0].len() as i32
    }

    pub fn height(&self) -> i32 {
        self.layout().len() as i32
    }

    /// Row of the lowest line of the current layout.
    pub fn bottom_y(&self) -> i32 {
        self.y + self.height() - 1
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape_type
    }

    pub fn rotation(&self) -> usize {
        self.rotation
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn snapshot(&self) -> ShapeSnapshot {
        ShapeSnapshot {
            x: self.x,
            y: self.y,
            shape_type: self.shape_type,
            rotation: self.rotation as u32,
            speed: self.speed,
        }
    }
}

/// Wire copy of a [`Shape`], detached from the live simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeSnapshot {
    pub x: i32,
    pub y: i32,
    pub shape_type: ShapeType,
    pub rotation: u32,
    pub speed: f32,
}

impl From<&ShapeSnapshot> for Shape {
    fn from(snapshot: &ShapeSnapshot) -> Self {
        Self {
            x: snapshot.x,
            y: snapshot.y,
            shape_type: snapshot.shape_type,
            rotation: snapshot.rotation as usize % snapshot.shape_type.layouts().len(),
            speed: snapshot.speed,
        }
    }
}

impl TryFrom<ShapeSnapshot> for Shape {
    type Error = WireError;

    /// Accepts only shapes lying entirely inside a `ROWS` x `COLS` grid.
    fn try_from(snapshot: ShapeSnapshot) -> Result<Self, Self::Error> {
        let shape = Shape::from(&snapshot);
        let (x, y) = (i64::from(shape.x), i64::from(shape.y));
        let inside = x >= 0
            && y >= 0
            && x + i64::from(shape.width()) <= COLS as i64
            && y + i64::from(shape.height()) <= ROWS as i64;
        if !inside {
            return Err(WireError::MalformedFrame(format!(
                "{:?} shape at ({}, {}) lies outside the grid",
                shape.shape_type, shape.x, shape.y
            )));
        }
        Ok(shape)
    }
}
