//! Running an encounter: initiative, turn order and difficulty.
//!
//! The functions here work on a slice of an encounter's combatants; the
//! store gathers them and writes the results back.

use crate::combat::CombatantState;
use crate::rules::{level_thresholds, monster_xp_multiplier, CombatRole, EncounterDifficulty};
use crate::world::{Monster, MonsterId};
use rand::Rng;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Initiative order: highest initiative first, combatants without one
/// last, then by id.
pub fn initiative_cmp(a: &CombatantState, b: &CombatantState) -> Ordering {
    b.initiative
        .cmp(&a.initiative)
        .then_with(|| a.id.cmp(&b.id))
}

/// Roll initiative for every monster combatant that doesn't have one.
///
/// Monsters of the same template act together: a template that already
/// has a rolled combatant lends that value to the rest, and otherwise one
/// roll of the template's initiative dice is shared by all of them.
/// Player combatants roll their own and are left alone.
///
/// Returns whether any dice were rolled.
pub fn roll_initiative<R: Rng>(
    combatants: &mut [CombatantState],
    templates: &HashMap<MonsterId, Monster>,
    rng: &mut R,
) -> bool {
    let mut shared: HashMap<MonsterId, i32> = combatants
        .iter()
        .filter(|c| c.role != CombatRole::Player)
        .filter_map(|c| Some((c.identity.monster()?, c.initiative?)))
        .collect();

    let mut rolled = false;
    for combatant in combatants.iter_mut() {
        if combatant.role == CombatRole::Player || combatant.initiative.is_some() {
            continue;
        }
        let Some(monster) = combatant.identity.monster() else {
            continue;
        };
        let Some(template) = templates.get(&monster) else {
            continue;
        };

        let initiative = *shared.entry(monster).or_insert_with(|| {
            rolled = true;
            let value = template.initiative_dice().roll_with_rng(rng);
            debug!(monster = %monster, initiative = value, "Rolled initiative");
            value
        });
        combatant.initiative = Some(initiative);
    }
    rolled
}

/// Hand the turn to the next combatants in initiative order.
///
/// `combatants` must be in initiative order. Combatants that are no longer
/// alive are skipped. Consecutive combatants with the same initiative, role
/// and template take their turn together. Wrapping back to the top of the
/// order starts a new round; the first turn of an encounter starts round 1.
pub fn next_turn(combatants: &mut [CombatantState], round: &mut u32) {
    let first_current = combatants.iter().position(|c| c.current_turn);
    let last_current = combatants.iter().rposition(|c| c.current_turn);
    for combatant in combatants.iter_mut() {
        combatant.current_turn = false;
    }

    let count = combatants.len();
    let start = last_current.map_or(0, |index| index + 1);
    let order: Vec<usize> = (start..count)
        .chain(0..start.min(count))
        .filter(|&index| combatants[index].is_alive())
        .collect();

    let Some(&leader) = order.first() else {
        return;
    };
    let (initiative, role, identity) = {
        let c = &combatants[leader];
        (c.initiative, c.role, c.identity)
    };
    for &index in &order {
        let c = &combatants[index];
        if c.initiative != initiative || c.role != role || c.identity != identity {
            break;
        }
        combatants[index].current_turn = true;
    }

    let new_current = combatants.iter().position(|c| c.current_turn);
    match (first_current, new_current) {
        (Some(previous), Some(current)) if current <= previous => *round += 1,
        (None, Some(_)) if *round == 0 => *round = 1,
        _ => {}
    }
}

/// XP value of a monster in an encounter, with its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonsterXp {
    pub role: CombatRole,
    pub xp: u32,
}

/// Rate an encounter against a party.
///
/// Monsters worth no XP are ignored. Friendly monsters' XP is taken off the
/// foes' total and they count towards the party size when `ally_adjusted`
/// is set. The adjusted total is compared with the sum of each character's
/// thresholds. Returns `None` when there are no foes or no characters.
pub fn encounter_difficulty(
    monsters: &[MonsterXp],
    party_levels: &[u8],
    ally_adjusted: bool,
) -> Option<EncounterDifficulty> {
    let foes: Vec<u32> = monsters
        .iter()
        .filter(|m| m.xp > 0 && m.role == CombatRole::Foe)
        .map(|m| m.xp)
        .collect();
    if foes.is_empty() || party_levels.is_empty() {
        return None;
    }

    let (ally_xp, ally_count) = if ally_adjusted {
        monsters
            .iter()
            .filter(|m| m.xp > 0 && m.role != CombatRole::Foe)
            .fold((0i64, 0usize), |(xp, count), m| (xp + i64::from(m.xp), count + 1))
    } else {
        (0, 0)
    };

    let multiplier = monster_xp_multiplier(foes.len(), party_levels.len() + ally_count);
    let foe_xp: i64 = foes.iter().map(|&xp| i64::from(xp)).sum();
    let modified = ((foe_xp - ally_xp) as f64 * multiplier) as i64;

    let mut thresholds = [0i64; 4];
    for &level in party_levels {
        for (total, threshold) in thresholds.iter_mut().zip(level_thresholds(level)) {
            *total += i64::from(threshold);
        }
    }
    let [easy, medium, hard, deadly] = thresholds;

    let difficulty = if deadly < modified {
        EncounterDifficulty::Deadly
    } else if hard < modified {
        EncounterDifficulty::Hard
    } else if medium < modified {
        EncounterDifficulty::Medium
    } else if easy < modified {
        EncounterDifficulty::Easy
    } else {
        EncounterDifficulty::Trivial
    };
    Some(difficulty)
}
