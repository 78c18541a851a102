//! Shared battlefield state the AI reads while thinking
//!
//! Owns the map service, the units, the node graph and per-turn memory
//! (danger marks and explored tiles). The AI only mutates it through commit
//! effects.

use ahash::{AHashMap, AHashSet};

use crate::battle::actions::ActionCost;
use crate::battle::nodes::NodeGraph;
use crate::battle::spatial::{MoveStyle, Path, ReachRequest, ReachableSet, SpatialQuery};
use crate::battle::units::Unit;
use crate::battle::visibility;
use crate::core::error::{AiError, Result};
use crate::core::types::{Faction, Position, UnitId};

/// Turns a sniper target stays marked after being spotted
pub const SNIPER_SPOTTING_TURNS: u32 = 2;

/// Result of tracing a shot through terrain and units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireTrace {
    Clear,
    Terrain(Position),
    Unit(UnitId),
}

pub struct Battlefield {
    pub map: Box<dyn SpatialQuery>,
    pub units: Vec<Unit>,
    pub nodes: NodeGraph,
    pub turn: u32,
    dangerous: AHashSet<Position>,
    explored: AHashMap<Faction, AHashMap<Position, u32>>,
}

impl std::fmt::Debug for Battlefield {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Battlefield")
            .field("dimensions", &self.map.dimensions())
            .field("units", &self.units.len())
            .field("nodes", &self.nodes.len())
            .field("turn", &self.turn)
            .finish()
    }
}

impl Battlefield {
    pub fn new(map: impl SpatialQuery + 'static) -> Self {
        Self {
            map: Box::new(map),
            units: Vec::new(),
            nodes: NodeGraph::new(),
            turn: 1,
            dangerous: AHashSet::new(),
            explored: AHashMap::new(),
        }
    }

    pub fn with_nodes(mut self, nodes: NodeGraph) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn add_unit(&mut self, unit: Unit) -> UnitId {
        let id = unit.id;
        self.units.push(unit);
        id
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.iter_mut().find(|u| u.id == id)
    }

    pub fn require_unit(&self, id: UnitId) -> Result<&Unit> {
        self.unit(id).ok_or(AiError::UnitNotFound(id))
    }

    pub fn living_units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(|u| !u.is_out())
    }

    /// Living unit whose footprint covers `pos`
    pub fn unit_at(&self, pos: Position) -> Option<&Unit> {
        self.living_units().find(|u| u.occupies(pos))
    }

    /// Tiles held by living units other than `except`
    pub fn occupied_except(&self, except: UnitId) -> AHashSet<Position> {
        self.living_units()
            .filter(|u| u.id != except)
            .flat_map(|u| u.footprint())
            .collect()
    }

    // === DANGER MARKS ===

    pub fn is_dangerous(&self, pos: Position) -> bool {
        self.dangerous.contains(&pos)
    }

    /// Flag every tile within `radius` of `center` on its level
    pub fn mark_dangerous(&mut self, center: Position, radius: i32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let pos = center.offset(dx, dy, 0);
                if center.distance_2d(&pos) <= radius && self.map.in_bounds(pos) {
                    self.dangerous.insert(pos);
                }
            }
        }
    }

    pub fn clear_danger(&mut self) {
        self.dangerous.clear();
    }

    // === MOVEMENT ===

    /// Tiles `unit` can reach from `origin` within `budget`
    pub fn reachable_from(
        &self,
        unit: &Unit,
        origin: Position,
        budget: ActionCost,
        style: MoveStyle,
    ) -> ReachableSet {
        let occupied = self.occupied_except(unit.id);
        let request = ReachRequest {
            origin,
            size: unit.size(),
            flying: unit.armor.flying,
            budget,
            style,
            occupied: &occupied,
        };
        self.map.reachable(&request)
    }

    /// Tiles reachable with the unit's current time units and energy
    pub fn reachable(&self, unit: &Unit, reserve: ActionCost, style: MoveStyle) -> ReachableSet {
        let budget = ActionCost::new(
            (unit.time_units - reserve.time).max(0),
            (unit.energy - reserve.energy).max(0),
        );
        self.reachable_from(unit, unit.position, budget, style)
    }

    /// Cheapest route for `unit` between two tiles, budget ignored
    pub fn path_between(
        &self,
        unit: &Unit,
        from: Position,
        goal: Position,
        style: MoveStyle,
    ) -> Option<Path> {
        let occupied = self.occupied_except(unit.id);
        let request = ReachRequest {
            origin: from,
            size: unit.size(),
            flying: unit.armor.flying,
            budget: ActionCost::new(i32::MAX / 2, i32::MAX / 2),
            style,
            occupied: &occupied,
        };
        self.map.path(&request, goal)
    }

    pub fn path_for(&self, unit: &Unit, goal: Position, style: MoveStyle) -> Option<Path> {
        self.path_between(unit, unit.position, goal, style)
    }

    // === FIRE AND SIGHT ===

    /// Trace a shot, stopping at terrain or the first unit not ignored
    pub fn trace_fire(&self, from: Position, to: Position, ignore: &[UnitId]) -> FireTrace {
        let trace = self.map.trace(from, to);
        for tile in &trace.visited {
            if let Some(unit) = self
                .living_units()
                .find(|u| u.occupies(*tile) && !ignore.contains(&u.id))
            {
                return FireTrace::Unit(unit.id);
            }
        }
        match trace.blocked_at {
            Some(pos) => FireTrace::Terrain(pos),
            None => FireTrace::Clear,
        }
    }

    /// A shot from `from` by `shooter` would strike `target`
    pub fn can_target_unit(&self, from: Position, shooter: UnitId, target: &Unit) -> bool {
        match self.trace_fire(from, target.position, &[shooter]) {
            FireTrace::Unit(id) => id == target.id,
            FireTrace::Clear => true,
            FireTrace::Terrain(_) => false,
        }
    }

    /// A shot from `from` would reach tile `to`, as if it were occupied
    pub fn can_target_tile(&self, from: Position, to: Position, ignore: &[UnitId]) -> bool {
        match self.trace_fire(from, to, ignore) {
            FireTrace::Clear => true,
            FireTrace::Unit(id) => self.unit(id).map_or(false, |u| u.occupies(to)),
            FireTrace::Terrain(_) => false,
        }
    }

    pub fn has_line_of_sight(&self, from: Position, to: Position, view_distance: i32) -> bool {
        visibility::has_line_of_sight(self.map.as_ref(), from, to, view_distance)
    }

    // === EXPLORATION MEMORY ===

    pub fn mark_explored(&mut self, faction: Faction, pos: Position) {
        self.explored.entry(faction).or_default().insert(pos, self.turn);
    }

    /// Turn `faction` last looked at `pos`
    pub fn last_explored(&self, faction: Faction, pos: Position) -> Option<u32> {
        self.explored.get(&faction).and_then(|m| m.get(&pos)).copied()
    }

    pub fn explored_this_turn(&self, faction: Faction, pos: Position) -> bool {
        self.last_explored(faction, pos) == Some(self.turn)
    }

    /// Never explored or not looked at since an earlier turn
    pub fn unexplored_this_turn(&self, faction: Faction, pos: Position) -> bool {
        self.last_explored(faction, pos).map_or(true, |t| t < self.turn)
    }

    /// Enemy spawn tiles
    pub fn spawn_points(&self) -> Vec<Position> {
        let (w, l, h) = self.map.dimensions();
        let mut points = Vec::new();
        for z in 0..h {
            for y in 0..l {
                for x in 0..w {
                    let pos = Position::new(x, y, z);
                    if self.map.tile(pos).map_or(false, |t| t.start_point) {
                        points.push(pos);
                    }
                }
            }
        }
        points
    }

    /// Recompute who sees whom and refresh faction memories
    pub fn refresh_visibility(&mut self, view_distance: i32) {
        let observers: Vec<(UnitId, Faction, Position)> = self
            .living_units()
            .map(|u| (u.id, u.faction, u.position))
            .collect();

        let mut sightings: Vec<(UnitId, Vec<UnitId>)> = Vec::with_capacity(observers.len());
        for &(id, _, from) in &observers {
            let seen = observers
                .iter()
                .filter(|(other, _, to)| *other != id && self.has_line_of_sight(from, *to, view_distance))
                .map(|(other, _, _)| *other)
                .collect();
            sightings.push((id, seen));
        }

        for &(_, faction, from) in &observers {
            for tile in visibility::visible_tiles(self.map.as_ref(), from, view_distance) {
                self.mark_explored(faction, tile);
            }
        }

        for (observer, seen) in sightings {
            let Some(observer_faction) = self.unit(observer).map(|u| u.faction) else {
                continue;
            };
            for target in &seen {
                if let Some(unit) = self.unit_mut(*target) {
                    let position = unit.position;
                    let sighting = unit.sighting_mut(observer_faction);
                    sighting.last_seen = Some(position);
                    sighting.blind_target = Some(position);
                    sighting.turns_since_seen = 0;
                    if unit.faction != observer_faction {
                        unit.turns_since_spotted = 0;
                        unit.turns_left_spotted_for_snipers = SNIPER_SPOTTING_TURNS;
                    }
                }
            }
            if let Some(unit) = self.unit_mut(observer) {
                unit.visible_units = seen;
            }
        }
    }

    /// Start the next turn: restore budgets, age memories, clear danger
    pub fn advance_turn(&mut self) {
        self.turn += 1;
        self.dangerous.clear();
        for unit in self.units.iter_mut() {
            unit.time_units = unit.stats.time_units;
            unit.energy = unit.stats.stamina;
            unit.turns_since_spotted = unit.turns_since_spotted.saturating_add(1);
            unit.turns_left_spotted_for_snipers = unit.turns_left_spotted_for_snipers.saturating_sub(1);
            for sighting in unit.sightings.values_mut() {
                sighting.turns_since_seen = sighting.turns_since_seen.saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::grid_map::GridMap;

    fn field() -> Battlefield {
        let mut battle = Battlefield::new(GridMap::open(12, 12, 1));
        battle.add_unit(Unit::new(UnitId(1), "a", Faction::Hostile, Position::new(1, 1, 0)));
        battle.add_unit(Unit::new(UnitId(2), "b", Faction::Player, Position::new(6, 1, 0)));
        battle.add_unit(Unit::new(UnitId(3), "c", Faction::Player, Position::new(3, 1, 0)));
        battle
    }

    #[test]
    fn test_fire_stops_at_first_unit() {
        let battle = field();
        let shooter = battle.unit(UnitId(1)).expect("exists");
        let far = battle.unit(UnitId(2)).expect("exists");
        assert_eq!(
            battle.trace_fire(shooter.position, far.position, &[UnitId(1)]),
            FireTrace::Unit(UnitId(3))
        );
        assert!(!battle.can_target_unit(shooter.position, UnitId(1), far));
        assert!(battle.can_target_tile(shooter.position, far.position, &[UnitId(1), UnitId(3)]));
    }

    #[test]
    fn test_visibility_updates_memory() {
        let mut battle = field();
        battle.refresh_visibility(20);
        let spotted = battle.unit(UnitId(2)).expect("exists");
        assert_eq!(spotted.turns_since_spotted, 0);
        assert_eq!(
            spotted.sighting(Faction::Hostile).last_seen,
            Some(Position::new(6, 1, 0))
        );
        assert!(battle.unit(UnitId(1)).map_or(false, |u| u.can_see(UnitId(2))));
        assert!(battle.explored_this_turn(Faction::Hostile, Position::new(5, 5, 0)));

        battle.advance_turn();
        assert!(battle.unexplored_this_turn(Faction::Hostile, Position::new(5, 5, 0)));
        let spotted = battle.unit(UnitId(2)).expect("exists");
        assert_eq!(spotted.sighting(Faction::Hostile).turns_since_seen, 1);
    }

    #[test]
    fn test_danger_marks() {
        let mut battle = field();
        battle.mark_dangerous(Position::new(5, 5, 0), 1);
        assert!(battle.is_dangerous(Position::new(5, 6, 0)));
        assert!(!battle.is_dangerous(Position::new(5, 7, 0)));
        battle.advance_turn();
        assert!(!battle.is_dangerous(Position::new(5, 5, 0)));
    }

    #[test]
    fn test_reachable_excludes_other_units() {
        let battle = field();
        let unit = battle.unit(UnitId(1)).expect("exists");
        let set = battle.reachable(unit, ActionCost::FREE, MoveStyle::Normal);
        assert!(set.contains(unit.position));
        assert!(!set.contains(Position::new(3, 1, 0)));
    }
}
