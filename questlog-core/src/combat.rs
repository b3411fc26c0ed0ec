//! Combatant state tracking.
//!
//! A combatant is one participant in an encounter: an individual monster
//! created from a template, or a player character. Its damage history only
//! grows; conditions come and go. Everything else about its condition in
//! the fight (hit points lost, status, health) is derived on read.

use crate::damage::DamageEvent;
use crate::error::{CoreError, Result};
use crate::rules::{Alignment, CombatRole, Condition, DamageType};
use crate::world::{CombatantId, EncounterId, ImmunityId, Monster, MonsterId, Player, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

// ============================================================================
// Identity
// ============================================================================

/// What a combatant is an instance of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombatantIdentity {
    Monster(MonsterId),
    Player(PlayerId),
}

impl CombatantIdentity {
    /// Build an identity from optional references, as they arrive from
    /// callers that name a monster and a player separately.
    pub fn from_parts(monster: Option<MonsterId>, player: Option<PlayerId>) -> Result<Self> {
        match (monster, player) {
            (Some(monster), None) => Ok(CombatantIdentity::Monster(monster)),
            (None, Some(player)) => Ok(CombatantIdentity::Player(player)),
            (Some(_), Some(_)) => Err(CoreError::conflict(
                "Combatant",
                "can't be both a monster and a player",
            )),
            (None, None) => Err(CoreError::conflict(
                "Combatant",
                "must be either a monster or a player",
            )),
        }
    }

    pub fn monster(&self) -> Option<MonsterId> {
        match self {
            CombatantIdentity::Monster(id) => Some(*id),
            CombatantIdentity::Player(_) => None,
        }
    }

    pub fn player(&self) -> Option<PlayerId> {
        match self {
            CombatantIdentity::Player(id) => Some(*id),
            CombatantIdentity::Monster(_) => None,
        }
    }
}

/// A monster template's immunity to a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionImmunity {
    pub id: ImmunityId,
    pub monster: MonsterId,
    pub condition: Condition,
}

impl ConditionImmunity {
    pub fn new(monster: MonsterId, condition: Condition) -> Self {
        Self {
            id: ImmunityId::new(),
            monster,
            condition,
        }
    }
}

// ============================================================================
// Combatant State
// ============================================================================

/// Derived state of a combatant in the fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombatantStatus {
    Unharmed,
    Damaged,
    Incapacitated,
    /// Out of the fight: a monster whose damage reached its hit points.
    Removed,
}

/// One participant in an encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatantState {
    pub id: CombatantId,
    pub encounter: EncounterId,
    pub identity: CombatantIdentity,
    pub role: CombatRole,
    pub initiative: Option<i32>,
    /// Hit points at the start of the fight. Player hit points aren't
    /// tracked.
    pub hit_points: Option<i32>,
    pub alignment: Option<Alignment>,
    /// Resistance picked from the template's resistance options.
    pub rolled_resistance: Option<DamageType>,
    pub notes: String,
    /// Whether it is this combatant's turn.
    #[serde(default)]
    pub current_turn: bool,
    damage: Vec<DamageEvent>,
    conditions: BTreeSet<Condition>,
}

impl CombatantState {
    /// A fresh foe created from a monster template.
    pub fn for_monster(encounter: EncounterId, monster: &Monster) -> Self {
        Self {
            id: CombatantId::new(),
            encounter,
            identity: CombatantIdentity::Monster(monster.id),
            role: CombatRole::Foe,
            initiative: None,
            hit_points: Some(monster.starting_hit_points()),
            alignment: monster.alignment,
            rolled_resistance: None,
            notes: String::new(),
            current_turn: false,
            damage: Vec::new(),
            conditions: BTreeSet::new(),
        }
    }

    /// A player character taking part in an encounter.
    pub fn for_player(encounter: EncounterId, player: &Player) -> Self {
        Self {
            id: CombatantId::new(),
            encounter,
            identity: CombatantIdentity::Player(player.id),
            role: CombatRole::Player,
            initiative: None,
            hit_points: None,
            alignment: Some(player.alignment),
            rolled_resistance: None,
            notes: String::new(),
            current_turn: false,
            damage: Vec::new(),
            conditions: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: CombatRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_initiative(mut self, initiative: i32) -> Self {
        self.initiative = Some(initiative);
        self
    }

    /// Check the combatant's role agrees with its identity.
    pub fn validate(&self) -> Result<()> {
        match (self.identity, self.role) {
            (CombatantIdentity::Player(_), CombatRole::Player) => Ok(()),
            (CombatantIdentity::Player(_), role) => Err(CoreError::conflict(
                "Combatant",
                format!("player combatant can't have role {}", role),
            )),
            (CombatantIdentity::Monster(_), CombatRole::Player) => Err(CoreError::conflict(
                "Combatant",
                "monster combatant can't have role Player",
            )),
            (CombatantIdentity::Monster(_), _) => Ok(()),
        }
    }

    // ========================================================================
    // Damage
    // ========================================================================

    /// Damage taken so far, in the order it was dealt.
    pub fn damage(&self) -> &[DamageEvent] {
        &self.damage
    }

    pub(crate) fn record_damage(&mut self, event: DamageEvent) {
        self.damage.push(event);
    }

    /// Total hit points lost over the fight.
    pub fn current_hit_points_lost(&self) -> u32 {
        self.damage
            .iter()
            .fold(0u32, |total, event| total.saturating_add(event.points))
    }

    /// Hit points left, when they are tracked.
    pub fn remaining_hit_points(&self) -> Option<i32> {
        let lost = i32::try_from(self.current_hit_points_lost()).unwrap_or(i32::MAX);
        self.hit_points.map(|hp| hp.saturating_sub(lost))
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    /// Add a condition. Returns false if it was already active.
    pub fn add_condition(&mut self, condition: Condition) -> bool {
        let added = self.conditions.insert(condition);
        if added {
            debug!(combatant = %self.id, %condition, "Condition added");
        }
        added
    }

    /// Add a condition unless the combatant is immune to it.
    ///
    /// Returns whether the condition is active afterwards.
    pub fn add_condition_checked(
        &mut self,
        condition: Condition,
        immunities: &[ConditionImmunity],
    ) -> bool {
        let immune = self.identity.monster().is_some_and(|monster| {
            immunities
                .iter()
                .any(|i| i.monster == monster && i.condition == condition)
        });
        if immune {
            debug!(combatant = %self.id, %condition, "Immune to condition");
            return false;
        }
        self.add_condition(condition);
        true
    }

    /// Remove a condition. Returns false if it wasn't active.
    pub fn remove_condition(&mut self, condition: Condition) -> bool {
        let removed = self.conditions.remove(&condition);
        if removed {
            debug!(combatant = %self.id, %condition, "Condition removed");
        }
        removed
    }

    pub fn has_condition(&self, condition: Condition) -> bool {
        self.conditions.contains(&condition)
    }

    /// Active conditions, in code order.
    pub fn active_conditions(&self) -> impl Iterator<Item = Condition> + '_ {
        self.conditions.iter().copied()
    }

    // ========================================================================
    // Derived state
    // ========================================================================

    pub fn status(&self) -> CombatantStatus {
        let lost = self.current_hit_points_lost();
        if self.role != CombatRole::Player {
            if let Some(hp) = self.hit_points {
                if i64::from(lost) >= i64::from(hp) {
                    return CombatantStatus::Removed;
                }
            }
        }
        if self.conditions.iter().any(Condition::is_incapacitating) {
            CombatantStatus::Incapacitated
        } else if lost > 0 {
            CombatantStatus::Damaged
        } else {
            CombatantStatus::Unharmed
        }
    }

    /// Whether the combatant still takes turns. Player deaths aren't
    /// tracked.
    pub fn is_alive(&self) -> bool {
        self.status() != CombatantStatus::Removed
    }

    /// Fraction of hit points remaining, from 0.0 to 1.0.
    pub fn health(&self) -> f64 {
        match self.hit_points {
            Some(hp) if hp > 0 => {
                let lost = f64::from(self.current_hit_points_lost());
                ((f64::from(hp) - lost) / f64::from(hp)).clamp(0.0, 1.0)
            }
            Some(_) => 0.0,
            None => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::DiceExpression;
    use crate::rules::{Background, CharacterClass, Race};

    fn goblin() -> Monster {
        Monster::new("Goblin", DiceExpression::parse("2d6").unwrap())
    }

    fn hit(state: &mut CombatantState, points: u32) {
        state.record_damage(DamageEvent {
            points,
            damage_type: DamageType::Slashing,
        });
    }

    #[test]
    fn test_hit_points_lost_sums_events() {
        let mut state = CombatantState::for_monster(EncounterId::new(), &goblin());
        assert_eq!(state.current_hit_points_lost(), 0);
        hit(&mut state, 3);
        hit(&mut state, 2);
        assert_eq!(state.current_hit_points_lost(), 5);
        assert_eq!(state.remaining_hit_points(), Some(2));
        assert_eq!(state.damage().len(), 2);
    }

    #[test]
    fn test_conditions_are_idempotent() {
        let mut state = CombatantState::for_monster(EncounterId::new(), &goblin());
        assert!(state.add_condition(Condition::Prone));
        assert!(!state.add_condition(Condition::Prone));
        assert_eq!(state.active_conditions().collect::<Vec<_>>(), vec![Condition::Prone]);

        assert!(state.remove_condition(Condition::Prone));
        assert!(!state.remove_condition(Condition::Prone));
        assert_eq!(state.active_conditions().count(), 0);
    }

    #[test]
    fn test_condition_immunity() {
        let monster = goblin();
        let immunities = [ConditionImmunity::new(monster.id, Condition::Charmed)];
        let mut state = CombatantState::for_monster(EncounterId::new(), &monster);

        assert!(!state.add_condition_checked(Condition::Charmed, &immunities));
        assert!(!state.has_condition(Condition::Charmed));
        assert!(state.add_condition_checked(Condition::Frightened, &immunities));
        assert!(state.has_condition(Condition::Frightened));
    }

    #[test]
    fn test_status_is_derived() {
        let mut state = CombatantState::for_monster(EncounterId::new(), &goblin());
        assert_eq!(state.status(), CombatantStatus::Unharmed);
        assert_eq!(state.health(), 1.0);

        hit(&mut state, 3);
        assert_eq!(state.status(), CombatantStatus::Damaged);

        state.add_condition(Condition::Stunned);
        assert_eq!(state.status(), CombatantStatus::Incapacitated);

        assert!(state.is_alive());
        hit(&mut state, 10);
        assert_eq!(state.status(), CombatantStatus::Removed);
        assert_eq!(state.health(), 0.0);
        assert!(!state.is_alive());
    }

    #[test]
    fn test_identity_from_parts() {
        let monster = MonsterId::new();
        let player = PlayerId::new();
        assert_eq!(
            CombatantIdentity::from_parts(Some(monster), None),
            Ok(CombatantIdentity::Monster(monster))
        );
        assert!(matches!(
            CombatantIdentity::from_parts(Some(monster), Some(player)),
            Err(CoreError::ValidationConflict { .. })
        ));
        assert!(matches!(
            CombatantIdentity::from_parts(None, None),
            Err(CoreError::ValidationConflict { .. })
        ));
    }

    #[test]
    fn test_role_must_match_identity() {
        let player = Player::new("Arden", Race::HighElf, CharacterClass::Wizard, Background::Sage);
        let state = CombatantState::for_player(EncounterId::new(), &player);
        assert!(state.validate().is_ok());
        assert!(state.clone().with_role(CombatRole::Friend).validate().is_err());

        let foe = CombatantState::for_monster(EncounterId::new(), &goblin());
        assert!(foe.validate().is_ok());
        assert!(foe.with_role(CombatRole::Player).validate().is_err());
    }
}
