//! Reachable-set scan used by the advanced policy
//!
//! Every tile the unit can reach this turn is scored in seven categories at
//! once. The travel target is the best tile of the first category, in
//! priority order, that has anything to offer.

use tracing::{debug, trace};

use crate::battle::actions::ActionCost;
use crate::battle::ai::context::Think;
use crate::battle::ai::scoring::melee::valid_melee_range;
use crate::battle::ai::threat::{max_extender_range, ReachMap};
use crate::battle::constants::{
    CUDDLE_DISTANCE, CUDDLE_WEIGHT, DANGER_TILE_DIVISOR, GRENADE_HANDLING_TU, HIDE_TU_FRACTION, INDOOR_COVER_BIAS,
    MELEE_THREAT_DISTANCE, AVOID_MELEE_DIVISOR,
};
use crate::battle::spatial::ReachableSet;
use crate::battle::units::Unit;
use crate::battle::visibility;
use crate::core::types::{Direction, Faction, Position};

/// Scan categories in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanCategory {
    /// Tile with a line of fire and time left to shoot
    Attack,
    /// Tile from which the suspected enemy tile is in view
    DirectPeek,
    /// Tile from which unexplored ground toward the enemy is in view
    IndirectPeek,
    /// Hidden from every tile an enemy could reach
    GreatCover,
    GoodCover,
    /// Cover next to a door
    OkayCover,
    Fallback,
}

impl ScanCategory {
    pub const COUNT: usize = 7;

    pub const ALL: [ScanCategory; Self::COUNT] = [
        ScanCategory::Attack,
        ScanCategory::DirectPeek,
        ScanCategory::IndirectPeek,
        ScanCategory::GreatCover,
        ScanCategory::GoodCover,
        ScanCategory::OkayCover,
        ScanCategory::Fallback,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_peek(self) -> bool {
        matches!(self, ScanCategory::DirectPeek | ScanCategory::IndirectPeek)
    }
}

/// What the scan knows before it starts
pub struct ScanSetup<'s> {
    /// Where the unit is heading: the enemy to walk to, or a tile to explore
    pub target: Position,
    pub walk_to: Option<&'s Unit>,
    pub peek: Position,
    pub reach: &'s ReachableSet,
    /// Costs from the travel target outward, used as a distance field
    pub target_reach: &'s ReachableSet,
    pub enemy_reach: &'s ReachMap,
    /// `max_tu` plus the distance field value at the turn's starting tile
    pub my_walk_to_dist: f32,
    /// Time the cheapest attack needs after moving
    pub attack_tu: i32,
    pub weapon_range: i32,
    /// Priming cost when a grenade is waiting to be primed
    pub prime_cost: Option<i32>,
    pub sweep: bool,
    pub pure_melee: bool,
    pub mind_controlled: bool,
    /// We were seen this turn and are not standing in a doorway
    pub contact: bool,
    pub immobile_enemies: bool,
    pub have_lof: bool,
    pub just_need_to_turn: bool,
    pub just_need_to_turn_to_peek: bool,
}

impl<'s> ScanSetup<'s> {
    pub fn new(
        target: Position,
        reach: &'s ReachableSet,
        target_reach: &'s ReachableSet,
        enemy_reach: &'s ReachMap,
    ) -> Self {
        Self {
            target,
            walk_to: None,
            peek: target,
            reach,
            target_reach,
            enemy_reach,
            my_walk_to_dist: 0.0,
            attack_tu: 0,
            weapon_range: 0,
            prime_cost: None,
            sweep: false,
            pure_melee: false,
            mind_controlled: false,
            contact: false,
            immobile_enemies: false,
            have_lof: false,
            just_need_to_turn: false,
            just_need_to_turn_to_peek: false,
        }
    }
}

/// Best tile per category plus what the winner implies for facing
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    best: [Option<(Position, f32)>; ScanCategory::COUNT],
    pub peek_direction: Option<Direction>,
    /// The best attack tile has a real line of fire, not only a door to open
    pub lof_after_move: bool,
    pub door_case: bool,
    /// Cost of the final step onto the best attack tile
    pub last_step_cost: i32,
}

impl ScanResult {
    pub fn best(&self, category: ScanCategory) -> Option<(Position, f32)> {
        self.best[category.index()]
    }

    fn offer(&mut self, category: ScanCategory, pos: Position, score: f32) -> bool {
        let current = self.best[category.index()].map_or(0.0, |(_, s)| s);
        if score > current {
            self.best[category.index()] = Some((pos, score));
            return true;
        }
        false
    }
}

/// Per-tile scores indexed by category
type Scores = [f32; ScanCategory::COUNT];

/// Scale everything but the attack score
fn scale_positioning(scores: &mut Scores, factor: f32) {
    for score in scores.iter_mut().skip(1) {
        *score *= factor;
    }
}

impl<'a> Think<'a> {
    /// Score every reachable tile in every category
    pub fn scan_reachable(&mut self, setup: &ScanSetup) -> ScanResult {
        let battle = self.battle;
        let me = self.unit;
        let my_pos = me.position;
        let tu = me.time_units;
        let max_tu = me.max_tu();
        let cheat = self.cheats_on_movement();
        let my_tile_hazard = battle.is_dangerous(my_pos) || battle.map.tile(my_pos).map_or(false, |t| t.fire);
        let checked_before = self.state.tu_when_checking == Some(tu);
        let mut result = ScanResult::default();

        for node in setup.reach.iter() {
            let pos = node.position;
            let cost = node.cost;
            let Some(tile) = battle.map.tile(pos) else {
                continue;
            };
            if !tile.floor && !me.armor.flying {
                continue;
            }
            if cost.time > tu || cost.energy > me.energy {
                continue;
            }
            let bad_path = !self.is_path_to_position_safe(setup.reach, pos);
            let target_dist = pos.distance(&setup.target);

            let mut cuddle = 1.0;
            let mut avoid_melee = false;
            let mut lof = false;
            let mut lof_before_friends = false;
            let mut closest_enemy = f32::MAX;

            for unit in battle.living_units() {
                if unit.id == me.id {
                    continue;
                }
                let unit_pos = if cheat || unit.faction == me.faction {
                    Some(unit.position)
                } else {
                    unit.sighting(me.faction).last_seen
                };
                if self.is_ally(unit) {
                    let Some(unit_pos) = unit_pos else {
                        continue;
                    };
                    let dist = pos.distance(&unit_pos);
                    if !setup.mind_controlled
                        && unit_pos.z == pos.z
                        && dist < CUDDLE_DISTANCE as f32
                        && self.quick_line_of_fire(pos, unit, false, false, false)
                    {
                        cuddle += 1.0 - dist * CUDDLE_WEIGHT;
                    }
                    continue;
                }
                let Some(unit_pos) = unit_pos else {
                    continue;
                };
                let dist = pos.distance(&unit_pos);
                if dist < MELEE_THREAT_DISTANCE as f32 && self.should_avoid_melee_range(unit) {
                    avoid_melee = true;
                }
                closest_enemy = closest_enemy.min(dist);
                if !self.advanced_valid_target(unit, true) {
                    continue;
                }
                if !setup.pure_melee && !lof {
                    lof = self.quick_line_of_fire(pos, unit, false, !cheat, false);
                    if !cheat && !lof {
                        lof = self.clear_sight(pos, unit_pos);
                    }
                    if lof {
                        lof_before_friends = true;
                        if self.projectile_may_harm_friends(pos, unit_pos) {
                            lof = false;
                        }
                    }
                }
                if self.has_tile_sight(pos, unit.position) {
                    lof_before_friends = true;
                }
            }

            closest_enemy = closest_enemy.min(target_dist);
            let out_of_range = setup.weapon_range as f32 > 0.0 && (setup.weapon_range as f32) < closest_enemy;
            let mut attack_tu = setup.attack_tu;

            if !lof && (pos != my_pos || setup.just_need_to_turn) {
                if let Some(walk_to) = setup.walk_to {
                    let valid = self.advanced_valid_target(walk_to, true);
                    if !setup.pure_melee && valid {
                        lof = self.quick_line_of_fire(pos, walk_to, false, !cheat, false);
                        if !cheat && !lof {
                            lof = self.clear_sight(pos, setup.target);
                        }
                        if lof {
                            lof_before_friends = true;
                            if self.projectile_may_harm_friends(pos, setup.target) {
                                lof = false;
                            }
                        }
                    }
                    if (!lof || setup.pure_melee || cheat)
                        && (valid || cheat)
                        && valid_melee_range(battle, pos, pos.direction_to(&setup.target), me, walk_to)
                        && (self.melee || self.quick_line_of_fire(pos, walk_to, false, !cheat, false))
                    {
                        lof = true;
                    }
                }
            }

            let mut should_have_attacked = pos == my_pos && checked_before;
            let mut real_lof = lof;
            let mut door_case = false;
            let spare = ActionCost::new(tu - cost.time, me.energy - cost.energy);
            let enough_to_peek = spare.time as f32 > max_tu as f32 * HIDE_TU_FRACTION
                && spare.energy as f32 > me.stats.stamina as f32 * HIDE_TU_FRACTION;

            // A target next to a door right beside us: go there and open it
            if !lof && enough_to_peek {
                let size = me.size();
                let beside = footprint_at(pos, size).into_iter().any(|check| {
                    battle.map.is_next_to_door(check)
                        && target_dist < (1 + size) as f32
                        && setup.target.z == check.z
                });
                if beside && (battle.map.is_next_to_door(setup.target) || setup.pure_melee) {
                    should_have_attacked = false;
                    lof = true;
                    real_lof = false;
                    attack_tu += GRENADE_HANDLING_TU;
                    door_case = true;
                }
            }
            let have_tu_to_attack = cost.time <= tu - attack_tu;

            let mut scores: Scores = [0.0; ScanCategory::COUNT];
            let mut last_step = 0;
            if !self.blaster && lof && have_tu_to_attack && (!should_have_attacked || setup.just_need_to_turn) {
                let reach_after = max_extender_range(me, spare.time, self.ctx.extender_accuracy);
                if reach_after as f32 >= target_dist || setup.pure_melee {
                    scores[ScanCategory::Attack.index()] = spare.time as f32;
                    if let Some(prev) = node.prev.and_then(|p| setup.reach.get(p)) {
                        last_step = cost.time - prev.cost.time;
                    }
                }
            }

            let indoors = battle.map.tile(pos.offset(0, 0, 1)).map_or(false, |t| t.floor);
            let walk_to_dist = max_tu as f32 + self.tu_cost_to_reach(pos, setup.target_reach, true) as f32;

            if !setup.sweep && me.ai.aggression > 0 {
                let hidden_target = setup.walk_to.map_or(false, |w| !self.advanced_valid_target(w, false));
                if enough_to_peek
                    && (!out_of_range || pos == my_pos)
                    && (pos != my_pos || setup.just_need_to_turn_to_peek)
                    && hidden_target
                {
                    let smoke = battle
                        .map
                        .tile(setup.target)
                        .map_or(0, |t| t.smoke)
                        .max(battle.map.tile(my_pos).map_or(0, |t| t.smoke));
                    let view = self.ctx.view_distance as f32;
                    let view = view.min(view / (1.0 + f32::from(smoke) / 3.0));
                    if target_dist <= view {
                        let sees = match battle.unit_at(setup.target) {
                            Some(occupant) => self.quick_line_of_fire(pos, occupant, false, false, false),
                            None => self.clear_sight(pos, setup.target),
                        };
                        if sees {
                            scores[ScanCategory::DirectPeek.index()] = spare.time as f32;
                        }
                    }
                    if pos == setup.peek || self.has_tile_sight(pos, setup.peek) {
                        scores[ScanCategory::IndirectPeek.index()] = spare.time as f32;
                    }
                }
            }

            if !lof_before_friends {
                let aggression = me.ai.aggression;
                let far_behind = walk_to_dist >= setup.my_walk_to_dist && !setup.contact;
                let mut valid_cover = !(aggression > 2 && far_behind);
                if valid_cover {
                    let below_floorless = battle.map.tile(pos.offset(0, 0, -1)).map_or(true, |t| !t.floor);
                    if !tile.floor && below_floorless {
                        valid_cover = false;
                    }
                    if battle.nodes.at(pos).is_none() && self.cover_value(pos, 3) == 0.0 {
                        valid_cover = false;
                    }
                }
                let next_to_door = battle.map.is_next_to_door(pos);

                let mut discover_threat = 0.0f32;
                if !setup.sweep && valid_cover {
                    for (&spot, &threat) in setup.enemy_reach {
                        let threat = threat as f32;
                        if threat <= discover_threat {
                            continue;
                        }
                        if footprint_at(pos, me.size())
                            .into_iter()
                            .any(|check| self.has_tile_sight(check, spot))
                        {
                            discover_threat = threat;
                        }
                    }
                    discover_threat = discover_threat.max(0.0);

                    let can_prime_there = setup.prime_cost.map_or(false, |p| p <= spare.time);
                    if discover_threat == 0.0 && !next_to_door && (aggression < 2 || can_prime_there) {
                        scores[ScanCategory::GreatCover.index()] = 100.0 / walk_to_dist;
                    }
                    let cover = 100.0 / (discover_threat + walk_to_dist);
                    if next_to_door {
                        scores[ScanCategory::OkayCover.index()] = cover;
                    } else {
                        scores[ScanCategory::GoodCover.index()] = cover;
                    }
                    if aggression > 2 && far_behind {
                        scores[ScanCategory::GreatCover.index()] = 0.0;
                        scores[ScanCategory::GoodCover.index()] = 0.0;
                        scores[ScanCategory::OkayCover.index()] = 0.0;
                    }
                }

                let cheaper_hide = self.state.break_los_cost.map_or(false, |c| cost.time < c.time);
                if (aggression < 3 || discover_threat == 0.0 || setup.immobile_enemies)
                    && !battle.is_dangerous(pos)
                    && !tile.fire
                    && cost.time as f32 <= max_tu as f32 * HIDE_TU_FRACTION
                    && !next_to_door
                    && (cheaper_hide || !checked_before)
                {
                    self.state.break_los_cost = Some(cost);
                    self.state.tu_when_checking = Some(tu);
                }
            }

            scores[ScanCategory::Fallback.index()] = 100.0 / walk_to_dist;
            scale_positioning(&mut scores, 1.0 / cuddle);

            let start_point = tile.start_point && me.original_faction == Faction::Player;
            if battle.is_dangerous(pos) || tile.fire {
                if setup.mind_controlled && !start_point {
                    scores[ScanCategory::Attack.index()] *= 2.0;
                    scale_positioning(&mut scores, DANGER_TILE_DIVISOR);
                } else {
                    scores[ScanCategory::Attack.index()] /= 2.0;
                    let factor = if my_tile_hazard { 1.0 / DANGER_TILE_DIVISOR } else { 0.0 };
                    scale_positioning(&mut scores, factor);
                }
            }
            if setup.mind_controlled && start_point {
                scores[ScanCategory::Attack.index()] /= 2.0;
                scale_positioning(&mut scores, 1.0 / DANGER_TILE_DIVISOR);
            }
            if me.ai.aggression == 0 && indoors {
                for category in [ScanCategory::GreatCover, ScanCategory::GoodCover, ScanCategory::OkayCover] {
                    scores[category.index()] *= INDOOR_COVER_BIAS;
                }
            }
            if avoid_melee || (bad_path && !setup.sweep) {
                for category in [ScanCategory::Attack, ScanCategory::DirectPeek, ScanCategory::IndirectPeek] {
                    scores[category.index()] /= AVOID_MELEE_DIVISOR;
                }
            }

            if self.tracing() {
                trace!(unit = ?me.id, tile = %pos, ?scores, "scan candidate");
            }

            if result.offer(ScanCategory::Attack, pos, scores[ScanCategory::Attack.index()]) {
                result.lof_after_move = real_lof;
                result.door_case = door_case;
                result.last_step_cost = last_step;
            }
            for category in [ScanCategory::GreatCover, ScanCategory::GoodCover, ScanCategory::OkayCover, ScanCategory::Fallback] {
                result.offer(category, pos, scores[category.index()]);
            }
            if result.offer(ScanCategory::DirectPeek, pos, scores[ScanCategory::DirectPeek.index()]) && !setup.sweep {
                result.peek_direction = Some(pos.direction_to(&setup.target));
            }
            if result.best(ScanCategory::DirectPeek).is_none()
                && result.offer(ScanCategory::IndirectPeek, pos, scores[ScanCategory::IndirectPeek.index()])
            {
                let look_at = if pos == setup.peek { setup.target } else { setup.peek };
                result.peek_direction = Some(pos.direction_to(&look_at));
            }
        }

        if self.tracing() {
            for category in ScanCategory::ALL {
                if let Some((pos, score)) = result.best(category) {
                    trace!(unit = ?me.id, ?category, tile = %pos, score, "best scan tile");
                }
            }
        }
        result
    }

    /// Something new would come into view from `from` looking `facing`
    fn sees_unexplored(&self, from: Position, facing: Direction) -> bool {
        let battle = self.battle;
        visibility::visible_tiles(battle.map.as_ref(), from, self.ctx.view_distance)
            .into_iter()
            .any(|tile| {
                tile != from
                    && facing.arc_to(from.direction_to(&tile)) <= 1
                    && battle.unexplored_this_turn(self.faction(), tile)
            })
    }

    /// Pick the travel target from a finished scan
    ///
    /// An attack tile only counts when there is time to shoot and then get
    /// back out of sight. Peeks need something unexplored to look at.
    pub fn choose_travel_target(&mut self, scan: &mut ScanResult, setup: &ScanSetup) -> Option<(Position, ScanCategory)> {
        let me = self.unit;
        if scan.last_step_cost != 0 {
            self.state.break_los_cost = Some(ActionCost::time(scan.last_step_cost));
        }
        let attack_tu = setup.attack_tu + self.state.break_los_cost.map_or(0, |c| c.time);

        if let Some((pos, _)) = scan.best(ScanCategory::Attack) {
            let move_tu = self.tu_cost_to_reach(pos, setup.reach, false);
            if move_tu <= me.time_units - attack_tu {
                debug!(unit = ?me.id, tile = %pos, "advancing to attack position");
                return Some((pos, ScanCategory::Attack));
            }
            scan.lof_after_move = setup.have_lof;
            if self.tracing() {
                trace!(unit = ?me.id, attack_tu, move_tu, "attack dismissed, no time to hide afterwards");
            }
        }

        let facing = scan.peek_direction.unwrap_or(me.facing);
        for category in [ScanCategory::DirectPeek, ScanCategory::IndirectPeek] {
            if let Some((pos, _)) = scan.best(category) {
                if self.sees_unexplored(pos, facing) {
                    return Some((pos, category));
                }
            }
        }
        [ScanCategory::GreatCover, ScanCategory::GoodCover, ScanCategory::OkayCover, ScanCategory::Fallback]
            .into_iter()
            .find_map(|category| scan.best(category).map(|(pos, _)| (pos, category)))
    }
}

fn footprint_at(pos: Position, size: i32) -> Vec<Position> {
    let mut tiles = Vec::with_capacity((size * size) as usize);
    for dx in 0..size {
        for dy in 0..size {
            tiles.push(pos.offset(dx, dy, 0));
        }
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::ai::context::AiRng;
    use crate::battle::ai::state::AiState;
    use crate::battle::battlefield::Battlefield;
    use crate::battle::constants::UNLIMITED_TU;
    use crate::battle::grid_map::GridMap;
    use crate::battle::spatial::MoveStyle;
    use crate::battle::units::WeaponSlot;
    use crate::battle::weapons::Weapon;
    use crate::core::config::PlanningContext;
    use crate::core::types::UnitId;
    use rand::SeedableRng;

    fn alien(pos: Position) -> Unit {
        Unit::new(UnitId(1), "alien", Faction::Hostile, pos).with_weapon(WeaponSlot::MainHand, Weapon::rifle())
    }

    fn walled_field() -> Battlefield {
        let rows: Vec<String> = (0..10).map(|_| format!("{}#{}", ".".repeat(10), ".".repeat(9))).collect();
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        Battlefield::new(GridMap::from_layers(&[&rows]))
    }

    #[test]
    fn test_attack_from_current_tile_on_fresh_turn() {
        let mut battle = Battlefield::new(GridMap::open(30, 20, 1));
        battle.add_unit(alien(Position::new(2, 10, 0)));
        battle.add_unit(
            Unit::new(UnitId(2), "soldier", Faction::Player, Position::new(15, 10, 0))
                .with_weapon(WeaponSlot::MainHand, Weapon::rifle()),
        );
        battle.refresh_visibility(30);

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(2);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let soldier = battle.unit(UnitId(2)).expect("exists");
        let me = battle.unit(UnitId(1)).expect("exists");

        let reach = think.reachable.clone();
        let unlimited = ActionCost::new(UNLIMITED_TU, UNLIMITED_TU);
        let target_reach = battle.reachable_from(me, soldier.position, unlimited, MoveStyle::Normal);
        let enemy_reach = think.enemy_reach_map();
        let mut setup = ScanSetup::new(soldier.position, &reach, &target_reach, &enemy_reach);
        setup.walk_to = Some(soldier);
        setup.attack_tu = 20;
        setup.weapon_range = max_extender_range(me, me.max_tu(), true);
        setup.have_lof = true;

        let mut scan = think.scan_reachable(&setup);
        let (pos, score) = scan.best(ScanCategory::Attack).expect("open ground gives a shot");
        assert_eq!(pos, Position::new(2, 10, 0));
        assert_eq!(score, me.time_units as f32);
        assert!(scan.lof_after_move);

        let choice = think.choose_travel_target(&mut scan, &setup);
        assert_eq!(choice, Some((Position::new(2, 10, 0), ScanCategory::Attack)));
    }

    #[test]
    fn test_hidden_side_of_wall_is_great_cover() {
        let mut battle = walled_field();
        battle.add_unit(alien(Position::new(3, 5, 0)));
        let mut soldier = Unit::new(UnitId(2), "soldier", Faction::Player, Position::new(16, 5, 0))
            .with_weapon(WeaponSlot::MainHand, Weapon::rifle());
        soldier.turns_since_spotted = 0;
        {
            let sighting = soldier.sighting_mut(Faction::Hostile);
            sighting.last_seen = Some(Position::new(16, 5, 0));
            sighting.turns_since_seen = 0;
        }
        battle.add_unit(soldier);

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(2);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let soldier = battle.unit(UnitId(2)).expect("exists");

        let reach = think.reachable.clone();
        let target_reach = ReachableSet::new();
        let enemy_reach = think.enemy_reach_map();
        let mut setup = ScanSetup::new(soldier.position, &reach, &target_reach, &enemy_reach);
        setup.walk_to = Some(soldier);
        setup.attack_tu = 20;
        setup.weapon_range = 30;

        let mut scan = think.scan_reachable(&setup);
        assert!(scan.best(ScanCategory::Attack).is_none());
        let (pos, category) = think
            .choose_travel_target(&mut scan, &setup)
            .expect("cover exists behind the wall");
        assert_eq!(category, ScanCategory::GreatCover);
        assert!(pos.x < 10);
        assert!(think.state.break_los_cost.is_some());
    }

    #[test]
    fn test_category_order() {
        assert_eq!(ScanCategory::ALL[0], ScanCategory::Attack);
        assert_eq!(ScanCategory::ALL[ScanCategory::COUNT - 1], ScanCategory::Fallback);
        assert!(ScanCategory::IndirectPeek.is_peek());
        assert!(!ScanCategory::GreatCover.is_peek());
    }

    #[test]
    fn test_result_keeps_highest_score() {
        let mut result = ScanResult::default();
        assert!(result.offer(ScanCategory::Fallback, Position::new(1, 1, 0), 0.5));
        assert!(!result.offer(ScanCategory::Fallback, Position::new(2, 1, 0), 0.4));
        assert!(!result.offer(ScanCategory::GoodCover, Position::new(2, 1, 0), 0.0));
        assert_eq!(result.best(ScanCategory::Fallback), Some((Position::new(1, 1, 0), 0.5)));
        assert!(result.best(ScanCategory::GoodCover).is_none());
    }
}
