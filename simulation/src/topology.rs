//! Node placement, radio range and mobility
//!
//! Provides the physical side of a scenario:
//! - Grid: initial positions laid out row or column first
//! - Unit disk: two nodes hear each other when within radio range
//! - Random waypoint: nodes walk to random points, pause, repeat

use std::fmt::Write as _;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// A point in the plane, in meters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Fill order of a grid layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridOrder {
    RowFirst,
    ColumnFirst,
}

/// Grid position allocator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridLayout {
    pub min_x: f64,
    pub min_y: f64,
    pub delta_x: f64,
    pub delta_y: f64,
    /// Nodes per row (or per column)
    pub grid_width: usize,
    pub order: GridOrder,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            min_y: 0.0,
            delta_x: 20.0,
            delta_y: 20.0,
            grid_width: 5,
            order: GridOrder::RowFirst,
        }
    }
}

impl GridLayout {
    /// Position of the `index`th node
    pub fn position(&self, index: usize) -> Position {
        let width = self.grid_width.max(1);
        let (col, row) = match self.order {
            GridOrder::RowFirst => (index % width, index / width),
            GridOrder::ColumnFirst => (index / width, index % width),
        };
        Position::new(
            self.min_x + self.delta_x * col as f64,
            self.min_y + self.delta_y * row as f64,
        )
    }

    /// Positions of the first `count` nodes
    pub fn positions(&self, count: usize) -> Vec<Position> {
        (0..count).map(|i| self.position(i)).collect()
    }
}

/// Random waypoint parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomWaypoint {
    /// Speed range in m/s, drawn uniformly per leg
    pub min_speed: f64,
    pub max_speed: f64,
    /// Pause at each waypoint
    pub pause: Duration,
    /// Waypoints are drawn uniformly in `[0, width] x [0, height]`
    pub width: f64,
    pub height: f64,
}

impl Default for RandomWaypoint {
    fn default() -> Self {
        Self {
            min_speed: 1.0,
            max_speed: 10.0,
            pause: Duration::from_secs(2),
            width: 100.0,
            height: 100.0,
        }
    }
}

/// How nodes move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mobility {
    Static,
    RandomWaypoint(RandomWaypoint),
}

#[derive(Debug, Clone, Copy)]
enum Leg {
    Moving { target: Position, speed: f64 },
    Paused { remaining: Duration },
}

/// Positions of all nodes and the radio model connecting them
#[derive(Debug, Clone)]
pub struct Topology {
    positions: Vec<Position>,
    range: f64,
    mobility: Mobility,
    legs: Vec<Leg>,
    rng: StdRng,
}

impl Topology {
    /// Nodes at fixed positions
    pub fn fixed(positions: Vec<Position>, range: f64) -> Self {
        Self::new(positions, range, Mobility::Static, 0)
    }

    /// Nodes starting at `positions` and moving per `mobility`
    ///
    /// Under random waypoint every node starts walking toward its first
    /// waypoint immediately.
    pub fn new(positions: Vec<Position>, range: f64, mobility: Mobility, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let legs = match &mobility {
            Mobility::Static => positions
                .iter()
                .map(|_| Leg::Paused {
                    remaining: Duration::MAX,
                })
                .collect(),
            Mobility::RandomWaypoint(model) => {
                positions.iter().map(|_| next_leg(model, &mut rng)).collect()
            }
        };
        Self {
            positions,
            range,
            mobility,
            legs,
            rng,
        }
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Radio range in meters
    pub fn range(&self) -> f64 {
        self.range
    }

    /// Current position of a node
    pub fn position(&self, node: usize) -> Option<Position> {
        self.positions.get(node).copied()
    }

    /// Whether the nodes move at all
    pub fn is_mobile(&self) -> bool {
        matches!(self.mobility, Mobility::RandomWaypoint(_))
    }

    /// Whether two distinct nodes are within radio range
    pub fn in_range(&self, a: usize, b: usize) -> bool {
        if a == b {
            return false;
        }
        match (self.positions.get(a), self.positions.get(b)) {
            (Some(pa), Some(pb)) => pa.distance(pb) <= self.range,
            _ => false,
        }
    }

    /// All nodes currently in range of `node`
    pub fn neighbors_of(&self, node: usize) -> Vec<usize> {
        (0..self.positions.len())
            .filter(|&other| self.in_range(node, other))
            .collect()
    }

    /// Advance every node by `dt`
    pub fn step(&mut self, dt: Duration) {
        let Mobility::RandomWaypoint(model) = &self.mobility else {
            return;
        };
        for (position, leg) in self.positions.iter_mut().zip(self.legs.iter_mut()) {
            let mut left = dt.as_secs_f64();
            while left > 0.0 {
                match *leg {
                    Leg::Moving { target, speed } => {
                        let distance = position.distance(&target);
                        let reach = speed * left;
                        if reach >= distance {
                            *position = target;
                            left -= if speed > 0.0 { distance / speed } else { left };
                            *leg = Leg::Paused {
                                remaining: model.pause,
                            };
                        } else {
                            let ratio = reach / distance;
                            position.x += (target.x - position.x) * ratio;
                            position.y += (target.y - position.y) * ratio;
                            left = 0.0;
                        }
                    }
                    Leg::Paused { remaining } => {
                        let pause = remaining.as_secs_f64();
                        if pause > left {
                            *leg = Leg::Paused {
                                remaining: remaining.saturating_sub(Duration::from_secs_f64(left)),
                            };
                            left = 0.0;
                        } else {
                            left -= pause;
                            *leg = next_leg(model, &mut self.rng);
                        }
                    }
                }
            }
        }
    }

    /// Render the neighbor lists as text
    pub fn visualize(&self, label: impl Fn(usize) -> String) -> String {
        let mut out = String::new();
        for node in 0..self.positions.len() {
            let pos = self.positions[node];
            let neighbors: Vec<String> = self.neighbors_of(node).into_iter().map(&label).collect();
            let _ = writeln!(
                out,
                "{:>10} ({:6.1}, {:6.1}) -> {}",
                label(node),
                pos.x,
                pos.y,
                neighbors.join(", ")
            );
        }
        out
    }
}

fn next_leg(model: &RandomWaypoint, rng: &mut StdRng) -> Leg {
    let target = Position::new(
        rng.random_range(0.0..=model.width),
        rng.random_range(0.0..=model.height),
    );
    let speed = if model.max_speed > model.min_speed {
        rng.random_range(model.min_speed..model.max_speed)
    } else {
        model.min_speed
    };
    Leg::Moving { target, speed }
}
