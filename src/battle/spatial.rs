//! Spatial query contract between the AI and the battle map
//!
//! The AI never walks tile storage directly. It asks a `SpatialQuery`
//! for reachable sets, paths, terrain traces and arc checks, so scoring can be
//! exercised against any map that honours the contract.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::battle::actions::ActionCost;
use crate::battle::pathfinding;
use crate::battle::visibility;
use crate::core::types::{Direction, Position};

/// Static terrain facts for one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TileState {
    pub floor: bool,
    pub wall: bool,
    pub window: bool,
    pub door: bool,
    pub fire: bool,
    /// Smoke density; each point shortens sight through the tile
    pub smoke: u8,
    /// Enemy spawn tile
    pub start_point: bool,
    /// Destructible base facility
    pub base_module: bool,
    /// Vertical connection to the levels above and below
    pub lift: bool,
}

impl TileState {
    pub fn open() -> Self {
        Self {
            floor: true,
            ..Self::default()
        }
    }

    pub fn blocks_movement(&self) -> bool {
        self.wall || self.window
    }

    pub fn blocks_fire(&self) -> bool {
        self.wall
    }
}

/// How a unit (or projectile) crosses the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MoveStyle {
    #[default]
    Normal,
    /// Cheaper in time, dearer in energy
    Run,
    /// Guided projectile: flies through open air, ignores units
    Missile,
}

/// Parameters for a reachability or path query
#[derive(Debug, Clone)]
pub struct ReachRequest<'a> {
    pub origin: Position,
    pub size: i32,
    pub flying: bool,
    pub budget: ActionCost,
    pub style: MoveStyle,
    /// Tiles held by other units
    pub occupied: &'a AHashSet<Position>,
}

/// One entry of a reachable set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachNode {
    pub position: Position,
    pub cost: ActionCost,
    pub prev: Option<Position>,
}

/// Tiles reachable within a budget, in discovery order
#[derive(Debug, Clone, Default)]
pub struct ReachableSet {
    nodes: Vec<ReachNode>,
    index: AHashMap<Position, usize>,
}

impl ReachableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or improve a node; returns true if it changed
    pub fn upsert(&mut self, node: ReachNode) -> bool {
        match self.index.get(&node.position) {
            Some(&i) if self.nodes[i].cost.time <= node.cost.time => false,
            Some(&i) => {
                self.nodes[i] = node;
                true
            }
            None => {
                self.index.insert(node.position, self.nodes.len());
                self.nodes.push(node);
                true
            }
        }
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.index.contains_key(&pos)
    }

    pub fn get(&self, pos: Position) -> Option<&ReachNode> {
        self.index.get(&pos).map(|&i| &self.nodes[i])
    }

    pub fn cost_to(&self, pos: Position) -> Option<ActionCost> {
        self.get(pos).map(|n| n.cost)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReachNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Steps from the origin to `goal`, origin excluded
    pub fn path_to(&self, goal: Position) -> Option<Vec<Position>> {
        let mut current = self.get(goal)?;
        let mut steps = vec![current.position];
        while let Some(prev) = current.prev {
            current = self.get(prev)?;
            if current.prev.is_some() {
                steps.push(current.position);
            }
            if steps.len() > self.nodes.len() {
                return None;
            }
        }
        steps.reverse();
        if steps.first() == Some(&current.position) {
            steps.clear();
        }
        Some(steps)
    }
}

/// A feasible route
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    /// Tiles to step through, origin excluded
    pub steps: Vec<Position>,
    pub cost: ActionCost,
}

impl Path {
    pub fn destination(&self) -> Option<Position> {
        self.steps.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Tiles crossed by a straight line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileTrace {
    /// Tiles entered, origin excluded, up to the target or the blocker
    pub visited: Vec<Position>,
    /// First tile that stopped the line
    pub blocked_at: Option<Position>,
    /// Accumulated smoke along the line
    pub smoke: i32,
}

impl TileTrace {
    pub fn is_clear(&self) -> bool {
        self.blocked_at.is_none()
    }
}

/// Battle map services consumed by the AI
pub trait SpatialQuery {
    /// Width, length and height in tiles
    fn dimensions(&self) -> (i32, i32, i32);

    fn tile(&self, pos: Position) -> Option<TileState>;

    /// Time cost of one step between adjacent tiles, `None` if impassable
    fn step_cost(&self, from: Position, to: Position, size: i32, flying: bool) -> Option<i32>;

    fn in_bounds(&self, pos: Position) -> bool {
        let (w, l, h) = self.dimensions();
        (0..w).contains(&pos.x) && (0..l).contains(&pos.y) && (0..h).contains(&pos.z)
    }

    /// Straight-line terrain trace; units are not considered
    fn trace(&self, from: Position, to: Position) -> TileTrace {
        visibility::trace_line(self, from, to)
    }

    /// Whether a thrown or lobbed object can land on `to`
    fn validate_arc(&self, from: Position, to: Position, max_range: i32) -> bool {
        visibility::validate_arc(self, from, to, max_range)
    }

    fn reachable(&self, request: &ReachRequest) -> ReachableSet {
        pathfinding::reachable(self, request)
    }

    /// Cheapest route to `goal` ignoring the budget's limit
    fn path(&self, request: &ReachRequest, goal: Position) -> Option<Path> {
        pathfinding::find_path(self, request, goal)
    }

    /// Direction of an adjacent window, if any
    fn window_direction(&self, pos: Position) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|&dir| self.tile(pos.step(dir)).map_or(false, |t| t.window))
    }

    fn is_next_to_door(&self, pos: Position) -> bool {
        Direction::ALL
            .into_iter()
            .any(|dir| self.tile(pos.step(dir)).map_or(false, |t| t.door))
    }
}
