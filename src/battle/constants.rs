//! Tactical AI constants - all tunable values in one place
//!
//! Scores are integers unless a value is a multiplier; multipliers apply to
//! integer odds and truncate afterwards.

// Think cycle
pub const MAX_THINK_PASSES: usize = 8;
pub const PATROL_REEVALUATE_PERCENT: i32 = 10;
pub const FORCED_SPOTTER_THRESHOLD: i32 = 2;

// Senses and handling
pub const SPOTTING_RADIUS: i32 = 20;
pub const GRENADE_HANDLING_TU: i32 = 4;
pub const KNEEL_UP_TU: i32 = 8;
pub const UNLIMITED_TU: i32 = 100_000;

// Mode odds
pub const ESCAPE_ODDS: i32 = 15;
pub const ESCAPE_ODDS_MELEE: i32 = 12;
pub const ESCAPE_ODDS_FRESH_HOSTILE: i32 = 5;
pub const AMBUSH_ODDS: i32 = 12;
pub const COMBAT_ODDS: i32 = 20;
pub const PATROL_ODDS: i32 = 30;
pub const PATROL_ODDS_ENEMY_VISIBLE: i32 = 15;
pub const CURRENT_MODE_INERTIA: f64 = 1.1;
pub const MELEE_COMBAT_BIAS: f64 = 1.3;
pub const SINGLE_TARGET_COMBAT_BIAS: f64 = 1.2;
pub const COMBAT_AMBUSH_BIAS: f64 = 1.5;
pub const AMBUSH_READY_BIAS: f64 = 1.7;
pub const BASE_DEFENSE_ESCAPE_BIAS: f64 = 0.75;
pub const BASE_DEFENSE_AMBUSH_BIAS: f64 = 0.6;
pub const AMBUSH_TOO_CLOSE: i32 = 5;
/// (escape, combat, ambush) multipliers below a third of full health
pub const BADLY_HURT_BIAS: (f64, f64, f64) = (1.7, 0.6, 0.75);
/// (escape, combat, ambush) multipliers below two thirds of full health
pub const HURT_BIAS: (f64, f64, f64) = (1.4, 0.8, 0.8);
pub const SCRATCHED_ESCAPE_BIAS: f64 = 1.1;
/// (escape, combat) multipliers for aggression 0 and 2
pub const TIMID_BIAS: (f64, f64) = (1.4, 0.7);
pub const BOLD_BIAS: (f64, f64) = (0.7, 1.4);
pub const CAUTIOUS_AMBUSH_BIAS: f64 = 1.1;

// Escape search
pub const ESCAPE_EXPOSURE_PENALTY: i32 = 10;
pub const ESCAPE_FIRE_PENALTY: i32 = 40;
pub const ESCAPE_DANGER_PENALTY: i32 = 100;
pub const ESCAPE_DISTANCE_WEIGHT: i32 = 10;
pub const ESCAPE_SYSTEMATIC_SCORE: i32 = 100;
pub const ESCAPE_DESPERATE_SCORE: i32 = 110;
pub const ESCAPE_FAST_PASS: i32 = 100;
pub const CURRENT_TILE_PREFERENCE: i32 = 15;
pub const ESCAPE_SCRAMBLE_RANGE: i32 = 20;
pub const ESCAPE_DESPERATE_SPREAD: i32 = 10;
pub const ESCAPE_MAX_TRIES: i32 = 150;
pub const OFF_MAP_SCORE: i32 = -100_001;
pub const ESCAPE_FAILURE_SCORE: i32 = -100_000;

// Local offset table (11x11 around the unit)
pub const TILE_SEARCH_RADIUS: i32 = 5;
pub const TILE_SEARCH_SIZE: usize = 121;

// Ambush search
pub const AMBUSH_BASE_SCORE: i32 = 100;
pub const AMBUSH_WINDOW_BONUS: i32 = 25;
pub const AMBUSH_FAST_PASS: i32 = 80;
pub const AMBUSH_MAX_DISTANCE: i32 = 10;

// Fire point search
pub const FIRE_POINT_BASE_SCORE: i32 = 100;
pub const FIRE_POINT_SPOTTER_PENALTY: i32 = 10;
pub const FIRE_POINT_FLANK_BONUS: i32 = 10;
pub const FIRE_POINT_FAST_PASS: i32 = 125;
pub const FIRE_POINT_ACCEPT: i32 = 70;

// Patrol
pub const PATROL_NODE_MAX_DIST_SQ: i32 = 1_000_000;
pub const PATROL_TRIES: usize = 5;
pub const BASE_MODULE_SEARCH_RADIUS: i32 = 5;

// Targeting
pub const NEAREST_TARGET_START: i32 = 100;
pub const CLOSEST_KNOWN_START: i32 = 255;
pub const RANDOM_TARGET_JITTER: i32 = 20;

// Vanilla fire mode bands
pub const CLOSE_RANGE_BAND: i32 = 4;
pub const LONG_RANGE_BAND: i32 = 12;
pub const SNAP_RANGE_LIMIT: i32 = 20;

// Explosives
pub const GRENADE_DESPERATION_THRESHOLD: i32 = 6;
pub const GRENADE_MIN_ENEMIES: i32 = 2;
pub const MASS_TARGET_COUNT: i32 = 10;
pub const SELF_BLAST_PENALTY: i32 = 4;
pub const FRIENDLY_BLAST_PENALTY: i32 = 2;
pub const INJURY_DESPERATION_BONUS: i32 = 3;
pub const BLAST_NODE_RANGE: i32 = 20;
pub const BLAST_NODE_MIN_SCORE: i32 = 2;

// Melee
pub const MELEE_CHARGE_RANGE: i32 = 20;
pub const MELEE_DODGE_DIVISOR: f32 = 160.0;
pub const MELEE_POINT_START_COST: i32 = 1000;
pub const RECKLESS_RUN_ENERGY_RATIO: f32 = 0.4;

// Melee or ranged choice
pub const MELEE_CHOICE_BASE_ODDS: i32 = 10;
pub const MELEE_CHOICE_DAMAGE_THRESHOLD: i32 = 50;
pub const MELEE_CHOICE_CROWD_PENALTY: i32 = 20;
pub const MELEE_CHOICE_TIMID_PENALTY: i32 = 20;
pub const MELEE_CHOICE_AGGRESSION_BONUS: i32 = 10;

// Guided weapons
pub const WAYPOINT_BASE_COUNT: i32 = 6;
pub const WAYPOINT_PER_DIFFICULTY: i32 = 2;
pub const MISSILE_PATH_BUDGET: i32 = 1_000;

// Psionics
pub const PSI_CONTROL_BASE_ODDS: i32 = 40;
pub const PSI_ODDS_STEP: i32 = 15;
pub const PSI_CONTROL_BONUS: i32 = 60;
pub const PSI_USE_RESTRAINT: i32 = 80;
pub const PSI_RESTRAINT_PER_DIFFICULTY: i32 = 10;
pub const PSI_PANIC_BONUS: i32 = 40;
pub const PSI_WEIGHT_ROLL_MIN: i32 = 35;
pub const PSI_WEIGHT_ROLL_MAX: i32 = 155;

// Advanced policy
pub const UNREACHABLE_COST: i32 = 10_000;
pub const REACH_NEAR_RADIUS: i32 = 3;
/// Moves this short on a full turn do not count as leaving sight of a tile
pub const ENCIRCLE_SHORT_MOVE_TU: i32 = 8;
pub const BLIND_FIRE_MAX_AGE: u32 = 2;
pub const BLIND_DANGER_FACTOR: f32 = 5.0;
pub const SIDESTEP_RADIUS: i32 = 2;
/// Allies closer than this with a clear line make a tile crowded
pub const CUDDLE_DISTANCE: i32 = 5;
pub const CUDDLE_WEIGHT: f32 = 0.2;
/// Enemies with a melee threat are kept beyond this distance
pub const MELEE_THREAT_DISTANCE: i32 = 2;
pub const INDOOR_COVER_BIAS: f32 = 10.0;
pub const AVOID_MELEE_DIVISOR: f32 = 10.0;
pub const DANGER_TILE_DIVISOR: f32 = 10.0;
/// Share of a full turn's time a unit keeps back to hide again
pub const HIDE_TU_FRACTION: f32 = 0.5;
/// Energy spent per time unit when running
pub const RUN_ENERGY_PER_TIME: f32 = 1.0;
/// An unseen enemy is assumed to cover this fraction of its time per turn
pub const GUESS_DISTANCE_DIVISOR: i32 = 4;
/// Time to turn around after moving into a firing position
pub const POST_MOVE_TURN_TU: i32 = 4;
/// Hit chance at which an advanced shot is treated as certain
pub const CERTAIN_HIT_ACCURACY: f32 = 1.0;
pub const AGGRESSIVE_SWEEP_THRESHOLD: i32 = 3;
pub const KNEEL_DOWN_TU: i32 = 4;
/// Damage rolls spread up to this multiple of nominal power
pub const DAMAGE_RANGE_FACTOR: f32 = 2.0;
/// Wounds are weighed this many times against remaining health
pub const FATAL_WOUND_WEIGHT: i32 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_table_matches_radius() {
        let side = (TILE_SEARCH_RADIUS * 2 + 1) as usize;
        assert_eq!(side * side, TILE_SEARCH_SIZE);
        assert!((TILE_SEARCH_SIZE as i32) < ESCAPE_MAX_TRIES);
    }

    #[test]
    fn test_escape_score_ordering() {
        assert!(ESCAPE_DESPERATE_SCORE > ESCAPE_SYSTEMATIC_SCORE);
        assert!(OFF_MAP_SCORE < ESCAPE_FAILURE_SCORE);
        assert!(ESCAPE_FAST_PASS <= ESCAPE_SYSTEMATIC_SCORE + CURRENT_TILE_PREFERENCE);
    }

    #[test]
    fn test_fast_pass_above_acceptance() {
        assert!(FIRE_POINT_FAST_PASS > FIRE_POINT_ACCEPT);
        assert!(AMBUSH_FAST_PASS < AMBUSH_BASE_SCORE);
    }
}
