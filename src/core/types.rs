//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};

/// Unique identifier for battle units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u32);

/// Identifier of an authored map node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Battle factions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Faction {
    Player,
    Hostile,
    Neutral,
}

impl Faction {
    pub const ALL: [Faction; 3] = [Faction::Player, Faction::Hostile, Faction::Neutral];

    /// The faction this side designates as its target
    pub fn opposing(self) -> Faction {
        match self {
            Faction::Player => Faction::Hostile,
            Faction::Hostile => Faction::Player,
            Faction::Neutral => Faction::Hostile,
        }
    }
}

/// Eight compass facings, clockwise from north (north is -y)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    pub fn index(self) -> i32 {
        self as i32
    }

    pub fn from_index(index: i32) -> Direction {
        Self::ALL[index.rem_euclid(8) as usize]
    }

    /// Unit step in tile coordinates
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::NorthEast => (1, -1),
            Direction::East => (1, 0),
            Direction::SouthEast => (1, 1),
            Direction::South => (0, 1),
            Direction::SouthWest => (-1, 1),
            Direction::West => (-1, 0),
            Direction::NorthWest => (-1, -1),
        }
    }

    pub fn opposite(self) -> Direction {
        self.rotate(4)
    }

    pub fn rotate(self, steps: i32) -> Direction {
        Self::from_index(self.index() + steps)
    }

    /// Number of 45 degree turns between two facings (0..=4)
    pub fn arc_to(self, other: Direction) -> i32 {
        let diff = (self.index() - other.index()).abs();
        diff.min(8 - diff)
    }

    pub fn is_diagonal(self) -> bool {
        self.index() % 2 == 1
    }
}

/// Tile position in the battle grid
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn step(&self, direction: Direction) -> Self {
        let (dx, dy) = direction.offset();
        self.offset(dx, dy, 0)
    }

    /// Squared distance, optionally including the vertical axis
    pub fn distance_sq(&self, other: &Position, consider_z: bool) -> i32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = if consider_z { self.z - other.z } else { 0 };
        dx * dx + dy * dy + dz * dz
    }

    /// Rounded planar distance
    pub fn distance_2d(&self, other: &Position) -> i32 {
        (self.distance_sq(other, false) as f64).sqrt().round() as i32
    }

    /// Rounded-up 3d distance, used for weapon range checks
    pub fn distance_3d(&self, other: &Position) -> i32 {
        (self.distance_sq(other, true) as f64).sqrt().ceil() as i32
    }

    /// Euclidean distance in tiles
    pub fn distance(&self, other: &Position) -> f32 {
        (self.distance_sq(other, true) as f32).sqrt()
    }

    /// Facing that points from `self` toward `other`
    pub fn direction_to(&self, other: &Position) -> Direction {
        let dx = (other.x - self.x) as f64;
        let dy = (other.y - self.y) as f64;
        if dx == 0.0 && dy == 0.0 {
            return Direction::North;
        }
        let angle = dx.atan2(-dy).rem_euclid(std::f64::consts::TAU);
        let sector = (angle / std::f64::consts::FRAC_PI_4).round() as i32;
        Direction::from_index(sector)
    }
}

impl std::ops::Add for Position {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Position {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_2d_rounds() {
        let a = Position::new(0, 0, 0);
        assert_eq!(a.distance_2d(&Position::new(3, 4, 0)), 5);
        assert_eq!(a.distance_2d(&Position::new(1, 1, 0)), 1);
        assert_eq!(a.distance_2d(&Position::new(6, 0, 2)), 6);
    }

    #[test]
    fn test_distance_3d_rounds_up() {
        let a = Position::new(0, 0, 0);
        assert_eq!(a.distance_3d(&Position::new(1, 1, 0)), 2);
        assert_eq!(a.distance_3d(&Position::new(6, 0, 0)), 6);
    }

    #[test]
    fn test_direction_to_compass() {
        let origin = Position::new(5, 5, 0);
        assert_eq!(origin.direction_to(&Position::new(5, 0, 0)), Direction::North);
        assert_eq!(origin.direction_to(&Position::new(9, 5, 0)), Direction::East);
        assert_eq!(origin.direction_to(&Position::new(8, 8, 0)), Direction::SouthEast);
        assert_eq!(origin.direction_to(&Position::new(1, 5, 0)), Direction::West);
    }

    #[test]
    fn test_direction_arc() {
        assert_eq!(Direction::North.arc_to(Direction::South), 4);
        assert_eq!(Direction::North.arc_to(Direction::NorthWest), 1);
        assert_eq!(Direction::East.arc_to(Direction::East), 0);
        assert_eq!(Direction::SouthWest.opposite(), Direction::NorthEast);
    }

    #[test]
    fn test_opposing_factions() {
        assert_eq!(Faction::Hostile.opposing(), Faction::Player);
        assert_eq!(Faction::Player.opposing(), Faction::Hostile);
        assert_eq!(Faction::Neutral.opposing(), Faction::Hostile);
    }
}
