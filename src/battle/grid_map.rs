//! In-memory tile grid implementing the spatial query contract
//!
//! Maps are written as ASCII layers, one string per row:
//!
//! | char | tile |
//! |------|------|
//! | `.`  | floor |
//! | `#`  | wall |
//! | `W`  | window (blocks movement, not fire) |
//! | `D`  | door |
//! | `F`  | burning floor |
//! | `S`  | smoke |
//! | `P`  | enemy spawn point |
//! | `B`  | base module |
//! | `L`  | lift between levels |
//! | ` `  | open air (no floor) |

use serde::{Deserialize, Serialize};

use crate::battle::spatial::{SpatialQuery, TileState};
use crate::core::types::Position;

/// Time units for an orthogonal step
pub const STRAIGHT_STEP_TU: i32 = 4;
/// Time units for a diagonal step
pub const DIAGONAL_STEP_TU: i32 = 6;
/// Time units to change level
pub const VERTICAL_STEP_TU: i32 = 8;

const SMOKE_DENSITY: u8 = 3;

/// Battle map as a dense grid of tiles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridMap {
    width: i32,
    length: i32,
    height: i32,
    tiles: Vec<TileState>,
}

impl GridMap {
    /// A map of floor on every level
    pub fn open(width: i32, length: i32, height: i32) -> Self {
        let count = (width.max(0) * length.max(0) * height.max(0)) as usize;
        Self {
            width,
            length,
            height,
            tiles: vec![TileState::open(); count],
        }
    }

    /// Build a map from ASCII layers (`layers[z][y]`, one char per x)
    pub fn from_layers(layers: &[&[&str]]) -> Self {
        let height = layers.len() as i32;
        let length = layers.iter().map(|l| l.len()).max().unwrap_or(0) as i32;
        let width = layers
            .iter()
            .flat_map(|l| l.iter())
            .map(|row| row.chars().count())
            .max()
            .unwrap_or(0) as i32;

        let mut map = Self::open(width, length, height);
        for (z, layer) in layers.iter().enumerate() {
            for (y, row) in layer.iter().enumerate() {
                for (x, c) in row.chars().enumerate() {
                    let pos = Position::new(x as i32, y as i32, z as i32);
                    map.set_tile(pos, Self::parse_tile(c));
                }
            }
        }
        map
    }

    fn parse_tile(c: char) -> TileState {
        let open = TileState::open();
        match c {
            '#' => TileState {
                wall: true,
                ..open
            },
            'W' => TileState {
                window: true,
                ..open
            },
            'D' => TileState { door: true, ..open },
            'F' => TileState { fire: true, ..open },
            'S' => TileState {
                smoke: SMOKE_DENSITY,
                ..open
            },
            'P' => TileState {
                start_point: true,
                ..open
            },
            'B' => TileState {
                base_module: true,
                ..open
            },
            'L' => TileState { lift: true, ..open },
            ' ' => TileState::default(),
            _ => open,
        }
    }

    fn index(&self, pos: Position) -> Option<usize> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(((pos.z * self.length + pos.y) * self.width + pos.x) as usize)
    }

    pub fn set_tile(&mut self, pos: Position, tile: TileState) {
        if let Some(i) = self.index(pos) {
            self.tiles[i] = tile;
        }
    }

    pub fn tile_mut(&mut self, pos: Position) -> Option<&mut TileState> {
        let i = self.index(pos)?;
        self.tiles.get_mut(i)
    }

    /// Surround the first level with walls
    pub fn with_border(mut self) -> Self {
        for x in 0..self.width {
            for y in 0..self.length {
                if x == 0 || y == 0 || x == self.width - 1 || y == self.length - 1 {
                    if let Some(tile) = self.tile_mut(Position::new(x, y, 0)) {
                        tile.wall = true;
                    }
                }
            }
        }
        self
    }

    /// All tiles matching a predicate, in storage order
    pub fn positions_where(&self, predicate: impl Fn(&TileState) -> bool) -> Vec<Position> {
        let mut found = Vec::new();
        for z in 0..self.height {
            for y in 0..self.length {
                for x in 0..self.width {
                    let pos = Position::new(x, y, z);
                    if self.tile(pos).map_or(false, |t| predicate(&t)) {
                        found.push(pos);
                    }
                }
            }
        }
        found
    }

    fn passable(&self, pos: Position, flying: bool) -> bool {
        match self.tile(pos) {
            Some(tile) => !tile.blocks_movement() && (tile.floor || flying),
            None => false,
        }
    }
}

impl SpatialQuery for GridMap {
    fn dimensions(&self) -> (i32, i32, i32) {
        (self.width, self.length, self.height)
    }

    fn tile(&self, pos: Position) -> Option<TileState> {
        self.index(pos).map(|i| self.tiles[i])
    }

    fn step_cost(&self, from: Position, to: Position, size: i32, flying: bool) -> Option<i32> {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let dz = to.z - from.z;
        if dx.abs() > 1 || dy.abs() > 1 || dz.abs() > 1 {
            return None;
        }

        for ox in 0..size {
            for oy in 0..size {
                if !self.passable(to.offset(ox, oy, 0), flying) {
                    return None;
                }
            }
        }

        if dz != 0 {
            if dx != 0 || dy != 0 {
                return None;
            }
            let lifts = self.tile(from).map_or(false, |t| t.lift)
                && self.tile(to).map_or(false, |t| t.lift);
            return (flying || lifts).then_some(VERTICAL_STEP_TU);
        }

        if dx != 0 && dy != 0 {
            // No cutting corners past walls
            let side_a = from.offset(dx, 0, 0);
            let side_b = from.offset(0, dy, 0);
            let blocked = |p: Position| self.tile(p).map_or(true, |t| t.blocks_movement());
            if blocked(side_a) || blocked(side_b) {
                return None;
            }
            return Some(DIAGONAL_STEP_TU);
        }

        Some(STRAIGHT_STEP_TU)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_map_creation() {
        let map = GridMap::open(30, 20, 2);
        assert_eq!(map.dimensions(), (30, 20, 2));
        assert!(map.in_bounds(Position::new(29, 19, 1)));
        assert!(!map.in_bounds(Position::new(30, 0, 0)));
        assert!(map.tile(Position::new(3, 3, 1)).map_or(false, |t| t.floor));
    }

    #[test]
    fn test_ascii_layers() {
        let map = GridMap::from_layers(&[&[
            ".#W", //
            "DFP", //
            "B  ", //
        ]]);
        let at = |x, y| map.tile(Position::new(x, y, 0)).expect("in bounds");
        assert!(at(1, 0).wall);
        assert!(at(2, 0).window);
        assert!(at(0, 1).door);
        assert!(at(1, 1).fire);
        assert!(at(2, 1).start_point);
        assert!(at(0, 2).base_module);
        assert!(!at(1, 2).floor);
    }

    #[test]
    fn test_step_costs() {
        let map = GridMap::open(5, 5, 1);
        let origin = Position::new(2, 2, 0);
        assert_eq!(map.step_cost(origin, origin.offset(1, 0, 0), 1, false), Some(4));
        assert_eq!(map.step_cost(origin, origin.offset(1, 1, 0), 1, false), Some(6));
        assert_eq!(map.step_cost(origin, origin.offset(2, 0, 0), 1, false), None);
    }

    #[test]
    fn test_no_corner_cutting() {
        let map = GridMap::from_layers(&[&[
            "..", //
            ".#", //
        ]]);
        assert_eq!(
            map.step_cost(Position::new(0, 1, 0), Position::new(1, 0, 0), 1, false),
            None
        );
    }

    #[test]
    fn test_border_and_air() {
        let map = GridMap::open(4, 4, 1).with_border();
        assert!(map.tile(Position::new(0, 2, 0)).map_or(false, |t| t.wall));
        let air = GridMap::from_layers(&[&[". "]]);
        let from = Position::new(0, 0, 0);
        assert_eq!(air.step_cost(from, Position::new(1, 0, 0), 1, false), None);
        assert_eq!(air.step_cost(from, Position::new(1, 0, 0), 1, true), Some(4));
    }
}
