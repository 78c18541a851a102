//! Damage and accuracy rules consumed read-only by the AI
//!
//! Every function is pure and clamps to zero instead of going negative.

use crate::battle::actions::ActionKind;
use crate::battle::units::{Armor, Unit};
use crate::battle::weapons::{DamageType, Weapon};
use crate::core::types::{Direction, Position};

/// Accuracy percentage for `kind`, before range effects
pub fn base_accuracy(unit: &Unit, weapon: &Weapon, kind: ActionKind) -> i32 {
    let Some(mode) = weapon.mode(kind) else {
        return 0;
    };
    let skill = match kind {
        ActionKind::Throw => unit.stats.throwing,
        ActionKind::Hit => unit.stats.melee,
        _ => unit.firing_accuracy_percent(),
    };
    (mode.accuracy * skill / 100).max(0)
}

/// Apply the per-tile dropoff outside `[min_range, upper]`
///
/// Shots beyond the weapon's hard maximum (throws excepted) cannot hit.
pub fn ranged_accuracy(
    weapon: &Weapon,
    kind: ActionKind,
    accuracy: i32,
    distance: i32,
    dropoff_enabled: bool,
) -> i32 {
    if kind != ActionKind::Throw && distance > weapon.max_range_for(kind) {
        return 0;
    }
    if !dropoff_enabled || kind == ActionKind::Throw {
        return accuracy.max(0);
    }
    let upper = weapon.mode_range(kind);
    let lower = weapon.min_range;
    let mut accuracy = accuracy;
    if distance > upper {
        accuracy -= (distance - upper) * weapon.dropoff;
    } else if distance < lower {
        accuracy -= (lower - distance) * weapon.dropoff;
    }
    accuracy.max(0)
}

/// Raw damage potential of one attack
pub fn power_bonus(unit: &Unit, weapon: &Weapon, kind: ActionKind) -> i32 {
    let mut power = weapon.power();
    if kind == ActionKind::Hit && weapon.strength_applied {
        power += unit.stats.strength / 4;
    }
    power.max(0)
}

/// Armour multiplier against a damage type
pub fn damage_modifier(armor: &Armor, damage_type: DamageType) -> f32 {
    armor.resistances[damage_type.index()].max(0.0)
}

/// Armour value facing an attack coming from `from`
pub fn armor_facing(target: &Unit, from: Position) -> i32 {
    let incoming = target.position.direction_to(&from);
    match target.facing.arc_to(incoming) {
        0 | 1 => target.armor.front,
        2 | 3 => target.armor.side,
        _ => target.armor.rear,
    }
}

/// Chance for a psi attack to land; negative means hopeless
pub fn psi_attack_chance(attacker: &Unit, weapon: &Weapon, victim: &Unit, kind: ActionKind) -> i32 {
    if attacker.stats.psi_skill <= 0 {
        return -1;
    }
    let Some(mode) = weapon.mode(kind) else {
        return -1;
    };
    let attack = mode.accuracy + attacker.stats.psi_strength * attacker.stats.psi_skill / 50;
    let defense = victim.stats.psi_strength + victim.stats.psi_skill / 5;
    let distance = attacker.position.distance_2d(&victim.position);
    attack - defense - distance + 50
}

/// Time needed to turn from one facing to another
pub fn turn_cost(unit: &Unit, from: Direction, to: Direction) -> i32 {
    from.arc_to(to) * unit.armor.turn_cost
}

/// Turn cost for the unit to face `target` from its current facing
pub fn turn_cost_towards(unit: &Unit, target: Position) -> i32 {
    turn_cost(unit, unit.facing, unit.position.direction_to(&target))
}

/// Whether a blast at `center_z` reaches a unit at `unit_z`
pub fn within_blast_height(explosion_height: i32, center_z: i32, unit_z: i32) -> bool {
    (center_z - unit_z).abs() <= explosion_height
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Faction, UnitId};

    fn shooter() -> Unit {
        Unit::new(UnitId(1), "shooter", Faction::Hostile, Position::new(0, 0, 0))
    }

    #[test]
    fn test_base_accuracy_scales_with_skill() {
        let unit = shooter();
        let rifle = Weapon::rifle();
        assert_eq!(base_accuracy(&unit, &rifle, ActionKind::SnapShot), 36);
        assert_eq!(base_accuracy(&unit, &rifle, ActionKind::Throw), 0);
    }

    #[test]
    fn test_dropoff_beyond_band() {
        let rifle = Weapon::rifle();
        assert_eq!(ranged_accuracy(&rifle, ActionKind::SnapShot, 36, 10, true), 36);
        assert_eq!(ranged_accuracy(&rifle, ActionKind::SnapShot, 36, 20, true), 26);
        assert_eq!(ranged_accuracy(&rifle, ActionKind::SnapShot, 36, 20, false), 36);
        assert_eq!(ranged_accuracy(&rifle, ActionKind::SnapShot, 36, 61, true), 0);
        assert_eq!(ranged_accuracy(&rifle, ActionKind::AutoShot, 10, 40, true), 0);
    }

    #[test]
    fn test_armor_facing() {
        let target = Unit::new(UnitId(2), "t", Faction::Player, Position::new(5, 5, 0))
            .facing(Direction::North);
        assert_eq!(armor_facing(&target, Position::new(5, 0, 0)), target.armor.front);
        assert_eq!(armor_facing(&target, Position::new(9, 5, 0)), target.armor.side);
        assert_eq!(armor_facing(&target, Position::new(5, 9, 0)), target.armor.rear);
    }

    #[test]
    fn test_psi_requires_skill() {
        let mut attacker = shooter();
        let victim = Unit::new(UnitId(2), "v", Faction::Player, Position::new(3, 0, 0));
        let amp = Weapon::psi_amp();
        assert!(psi_attack_chance(&attacker, &amp, &victim, ActionKind::PsiPanic) < 0);
        attacker.stats.psi_skill = 60;
        attacker.stats.psi_strength = 60;
        assert!(psi_attack_chance(&attacker, &amp, &victim, ActionKind::PsiPanic) > 0);
    }

    #[test]
    fn test_turn_cost() {
        let unit = shooter().facing(Direction::North);
        assert_eq!(turn_cost_towards(&unit, Position::new(0, 5, 0)), 4);
        assert_eq!(turn_cost_towards(&unit, Position::new(0, -5, 0)), 0);
    }
}
