//! Node-graph searches: patrol routes and ambush spots
//!
//! Nodes give map makers control over where units wander and lie in wait.
//! A patrol destination is claimed when chosen and released once reached.

use rand::seq::SliceRandom;
use tracing::{debug, trace};

use crate::battle::actions::{ActionCost, ActionKind};
use crate::battle::ai::action::{CommitEffect, PlannedAction};
use crate::battle::ai::context::Think;
use crate::battle::constants::{
    AMBUSH_BASE_SCORE, AMBUSH_FAST_PASS, AMBUSH_MAX_DISTANCE, AMBUSH_WINDOW_BONUS, BASE_MODULE_SEARCH_RADIUS,
    PATROL_NODE_MAX_DIST_SQ, PATROL_TRIES,
};
use crate::battle::nodes::Node;
use crate::battle::spatial::MoveStyle;
use crate::battle::weapons::DamageType;
use crate::core::types::{Faction, NodeId, Position};

impl<'a> Think<'a> {
    /// Nodes this unit could stand on
    fn node_usable(&self, node: &Node) -> bool {
        !node.flags.dummy && node.fits(self.unit.size())
    }

    /// Nearest usable node on the unit's level
    fn closest_node_on_level(&self) -> Option<NodeId> {
        let pos = self.position();
        let mut closest = PATROL_NODE_MAX_DIST_SQ;
        let mut found = None;
        for node in self.battle.nodes.iter() {
            if !self.node_usable(node) || node.position.z != pos.z {
                continue;
            }
            let d = pos.distance_sq(&node.position, true);
            if d < closest {
                closest = d;
                found = Some(node.id);
            }
        }
        found
    }

    /// Pick a free node to walk to
    ///
    /// Scouts roam over every node on the map. Everyone else shuffles to a
    /// node linked to `from`, preferring ranked ones.
    pub fn get_patrol_node(&mut self, scout: bool, from: Option<NodeId>) -> Option<NodeId> {
        let battle = self.battle;
        let from_node = from.and_then(|id| battle.nodes.get(id));
        let candidates: Vec<&Node> = match (scout, from_node) {
            (false, Some(origin)) => origin.links.iter().filter_map(|&id| battle.nodes.get(id)).collect(),
            _ => battle.nodes.iter().collect(),
        };

        let compliant: Vec<&Node> = candidates
            .into_iter()
            .filter(|n| self.node_usable(n))
            .filter(|n| scout || n.rank > 0 || n.flags.target)
            .filter(|n| !n.is_allocated() && Some(n.id) != from)
            .filter(|n| battle.map.tile(n.position).is_some() && !battle.is_dangerous(n.position))
            .collect();

        if compliant.is_empty() {
            return None;
        }
        if !scout {
            let best_rank = compliant.iter().map(|n| n.rank).max().unwrap_or(0);
            let preferred: Vec<&Node> = compliant.iter().copied().filter(|n| n.rank == best_rank).collect();
            return preferred.choose(&mut *self.rng).map(|n| n.id);
        }
        compliant.choose(&mut *self.rng).map(|n| n.id)
    }

    /// Base module near the unit that a snap shot could destroy
    fn base_module_in_reach(&self) -> Option<Position> {
        let pos = self.position();
        let r = BASE_MODULE_SEARCH_RADIUS;
        for dy in -r..=r {
            for dx in -r..=r {
                let tile = pos.offset(dx, dy, 0);
                if self.battle.map.tile(tile).map_or(false, |t| t.base_module) {
                    return Some(tile);
                }
            }
        }
        None
    }

    /// A snap shot at a base module, for small hostiles guarding a target node
    fn base_sabotage(&mut self) -> Option<PlannedAction> {
        let slot = self.weapon?;
        let weapon = self.weapon_ref()?;
        if weapon.snap.is_none() || !weapon.has_ammo() || weapon.damage_type() == Some(DamageType::Explosive) {
            return None;
        }
        let module = self.base_module_in_reach()?;
        let cost = weapon.cost(ActionKind::SnapShot)?;
        self.state.found_base_module = self.ctx.destroy_base_facilities;
        debug!(unit = ?self.unit.id, target = %module, "base module in sight");
        Some(PlannedAction::attack(ActionKind::SnapShot, module, slot, cost))
    }

    /// Choose the next patrol leg
    ///
    /// Reaching the destination frees it and turns toward a window if one is
    /// adjacent. Up to five attempts are made to find a node with a route.
    pub fn setup_patrol(&mut self) -> PlannedAction {
        let battle = self.battle;
        let me = self.unit;

        if let Some(to) = self.state.to_node {
            if battle.nodes.get(to).map_or(false, |n| n.position == me.position) {
                if self.tracing() {
                    trace!(unit = ?me.id, node = ?to, "patrol destination reached");
                }
                self.state.from_node = Some(to);
                self.state.to_node = None;
                self.emit(CommitEffect::FreeNode(to));
                if let Some(dir) = battle.map.window_direction(me.position) {
                    if dir != me.facing {
                        self.emit(CommitEffect::SetFacing(dir));
                    }
                }
            }
        }

        if self.state.from_node.is_none() {
            self.state.from_node = self.closest_node_on_level();
        }

        let hostile_origin = me.original_faction == Faction::Hostile;
        let mut tries = PATROL_TRIES;
        while self.state.to_node.is_none() && tries > 0 {
            tries -= 1;
            let from = self.state.from_node.and_then(|id| battle.nodes.get(id));

            let mut scout = true;
            if !self.ctx.base_defense {
                let on_fire = battle.map.tile(me.position).map_or(false, |t| t.fire);
                scout = self.ctx.cheating || from.map_or(true, |n| n.rank == 0) || on_fire;
            } else if me.size() == 1 && hostile_origin {
                if from.map_or(false, |n| n.flags.target) {
                    if let Some(action) = self.base_sabotage() {
                        return action;
                    }
                } else {
                    let mut closest = PATROL_NODE_MAX_DIST_SQ;
                    for node in battle.nodes.iter() {
                        if !self.node_usable(node) || !node.flags.target || node.is_allocated() {
                            continue;
                        }
                        let d = me.position.distance_sq(&node.position, true);
                        if self.state.to_node.is_none() || (d < closest && Some(node.id) != self.state.from_node) {
                            self.state.to_node = Some(node.id);
                            closest = d;
                        }
                    }
                }
            }

            if self.state.to_node.is_none() {
                let from = self.state.from_node;
                self.state.to_node = self
                    .get_patrol_node(scout, from)
                    .or_else(|| self.get_patrol_node(!scout, from));
            }

            if let Some(to) = self.state.to_node {
                let routed = battle
                    .nodes
                    .get(to)
                    .and_then(|n| battle.path_for(me, n.position, MoveStyle::Normal))
                    .map_or(false, |p| !p.is_empty());
                if !routed {
                    self.state.to_node = None;
                }
            }
        }

        let Some(to) = self.state.to_node else {
            return PlannedAction::rethink();
        };
        let Some(target) = battle.nodes.get(to).map(|n| n.position) else {
            return PlannedAction::rethink();
        };
        if !battle.nodes.is_allocated(to) {
            self.emit(CommitEffect::AllocateNode(to));
        }
        self.walk_plan(target, false).unwrap_or_else(|| PlannedAction::walk(target, ActionCost::FREE))
    }

    /// Find a node the closest known enemy would walk past without seeing us
    ///
    /// The facing at the spot points at the first tile of the enemy's route
    /// that we could shoot at. Sets `ambush_tus` (1 when staying put).
    pub fn setup_ambush(&mut self) -> PlannedAction {
        self.state.ambush_tus = 0;
        if !self.select_closest_known_enemy() {
            if self.tracing() {
                trace!(unit = ?self.unit.id, "ambush estimation failed");
            }
            return PlannedAction::rethink();
        }
        let Some(target) = self.aggro_unit() else {
            return PlannedAction::rethink();
        };
        let battle = self.battle;
        let me = self.unit;

        let mut best_score = 0;
        let mut best: Option<(Position, ActionCost)> = None;
        let mut enemy_route: Vec<Position> = Vec::new();

        for node in battle.nodes.iter() {
            if node.flags.dummy {
                continue;
            }
            let pos = node.position;
            if battle.map.tile(pos).is_none()
                || pos.distance_2d(&me.position) > AMBUSH_MAX_DISTANCE
                || pos.z != me.position.z
                || battle.is_dangerous(pos)
                || !self.reachable_with_attack.contains(pos)
            {
                continue;
            }
            if battle.can_target_tile(target.position, pos, &[target.id, me.id]) || self.spotting_units(pos) > 0 {
                continue;
            }
            let Some(cost) = self.route_cost(pos, MoveStyle::Normal) else {
                continue;
            };
            let Some(route) = battle.path_for(target, pos, MoveStyle::Normal) else {
                continue;
            };

            let mut score = AMBUSH_BASE_SCORE - cost.time;
            if battle.map.window_direction(pos).is_some() {
                score += AMBUSH_WINDOW_BONUS;
            }
            if self.tracing() {
                trace!(unit = ?me.id, tile = %pos, score, "ambush candidate");
            }
            if score > best_score {
                best_score = score;
                best = Some((pos, cost));
                enemy_route = route.steps;
                if best_score > AMBUSH_FAST_PASS {
                    break;
                }
            }
        }

        let Some((spot, cost)) = best else {
            if self.tracing() {
                trace!(unit = ?me.id, "ambush estimation failed");
            }
            return PlannedAction::rethink();
        };
        self.state.ambush_tus = if spot == me.position { 1 } else { cost.time };

        let facing = enemy_route
            .iter()
            .find(|&&step| battle.can_target_tile(spot, step, &[me.id, target.id]))
            .map(|&step| spot.direction_to(&step));

        let mut plan = if spot == me.position {
            PlannedAction::walk(spot, ActionCost::FREE)
        } else {
            self.walk_plan(spot, false).unwrap_or_else(|| PlannedAction::walk(spot, cost))
        };
        plan.final_facing = facing;
        plan.target_unit = Some(target.id);
        debug!(unit = ?me.id, spot = %spot, score = best_score, "ambush planned");
        plan
    }
}
