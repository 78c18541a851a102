//! Positioning searches
//!
//! Three ways to pick a tile: authored nodes (patrol and ambush), a shuffled
//! local offset table (escape and fire points) and a scan over everything
//! reachable (advanced policy). Every candidate is checked against the
//! pathfinder before it is accepted.

pub mod local_search;
pub mod node_search;
pub mod reachable_scan;

pub use reachable_scan::{ScanCategory, ScanResult};

use crate::battle::actions::ActionCost;
use crate::battle::ai::action::PlannedAction;
use crate::battle::ai::context::Think;
use crate::battle::spatial::MoveStyle;
use crate::battle::units::Unit;
use crate::core::types::Position;

/// Whether `pos` lies in the 90 degree cone `watcher` is facing
pub fn in_view_sector(watcher: &Unit, pos: Position) -> bool {
    if pos == watcher.position {
        return true;
    }
    watcher.facing.arc_to(watcher.position.direction_to(&pos)) <= 1
}

impl<'a> Think<'a> {
    /// Walk toward `target` along the cheapest route
    ///
    /// The cost covers the stretch the unit can pay for this turn. `None`
    /// when no route exists or the unit already stands there.
    pub fn walk_plan(&self, target: Position, run: bool) -> Option<PlannedAction> {
        let style = if run { MoveStyle::Run } else { MoveStyle::Normal };
        let path = self.battle.path_for(self.unit, target, style)?;
        if path.is_empty() {
            return None;
        }
        let cost = if path.cost.affordable(self.unit.time_units, self.unit.energy) {
            path.cost
        } else {
            path.steps
                .iter()
                .rev()
                .find_map(|&step| self.reachable.cost_to(step))
                .unwrap_or(ActionCost::FREE)
        };
        let mut plan = PlannedAction::walk(target, cost);
        plan.run = run;
        Some(plan)
    }

    /// Full time cost of the route to `target`, zero for the current tile
    pub fn route_cost(&self, target: Position, style: MoveStyle) -> Option<ActionCost> {
        if target == self.position() {
            return Some(ActionCost::FREE);
        }
        let path = self.battle.path_for(self.unit, target, style)?;
        (!path.is_empty()).then_some(path.cost)
    }
}
