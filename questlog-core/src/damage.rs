//! Damage resolution.
//!
//! Incoming damage is reduced or increased by the target monster's damage
//! qualifiers before it is recorded against the combatant:
//!
//! - any matching immunity reduces the damage to 0
//! - otherwise a matching resistance halves it, rounding down
//! - a matching vulnerability doubles it (after any resistance)
//!
//! Only the effective amount is recorded. The order qualifiers were
//! registered in never changes the result.

use crate::combat::CombatantState;
use crate::error::{CoreError, Result};
use crate::rules::{AttackType, DamageType};
use crate::world::{MonsterId, QualifierId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How a qualifier changes matching damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualifierKind {
    Immunity,
    Resistance,
    Vulnerability,
}

/// A monster's immunity, resistance, or vulnerability to a damage type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageQualifier {
    pub id: QualifierId,
    pub monster: MonsterId,
    pub damage_type: DamageType,
    /// Attacks the qualifier applies to. `AttackType::All` applies to any.
    pub attack_type: AttackType,
    pub kind: QualifierKind,
    /// Free text shown alongside the qualifier, e.g. "in bear form".
    pub annotation: Option<String>,
}

impl DamageQualifier {
    pub fn new(monster: MonsterId, kind: QualifierKind, damage_type: DamageType) -> Self {
        Self {
            id: QualifierId::new(),
            monster,
            damage_type,
            attack_type: AttackType::All,
            kind,
            annotation: None,
        }
    }

    pub fn immunity(monster: MonsterId, damage_type: DamageType) -> Self {
        Self::new(monster, QualifierKind::Immunity, damage_type)
    }

    pub fn resistance(monster: MonsterId, damage_type: DamageType) -> Self {
        Self::new(monster, QualifierKind::Resistance, damage_type)
    }

    pub fn vulnerability(monster: MonsterId, damage_type: DamageType) -> Self {
        Self::new(monster, QualifierKind::Vulnerability, damage_type)
    }

    pub fn with_attack_type(mut self, attack_type: AttackType) -> Self {
        self.attack_type = attack_type;
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    /// Whether this qualifier applies to the given damage.
    pub fn matches(&self, damage_type: DamageType, attack_type: AttackType) -> bool {
        self.damage_type == damage_type
            && (self.attack_type == AttackType::All || self.attack_type == attack_type)
    }
}

/// Damage as dealt, before the target's qualifiers apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDamage {
    pub points: i64,
    pub damage_type: DamageType,
    pub attack_type: AttackType,
}

impl RawDamage {
    pub fn new(points: i64, damage_type: DamageType, attack_type: AttackType) -> Self {
        Self {
            points,
            damage_type,
            attack_type,
        }
    }
}

/// Damage recorded against a combatant, after qualifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageEvent {
    pub points: u32,
    pub damage_type: DamageType,
}

/// Compute the damage a target actually takes.
///
/// `extra_resistance` is a resistance the individual rolled when it was
/// created, applying to all attacks of that type.
pub fn effective_points(
    raw: &RawDamage,
    qualifiers: &[DamageQualifier],
    extra_resistance: Option<DamageType>,
) -> Result<u32> {
    if raw.points < 0 {
        return Err(CoreError::InvalidDamageAmount { points: raw.points });
    }
    let points = u32::try_from(raw.points).unwrap_or(u32::MAX);

    let mut immune = false;
    let mut resistant = extra_resistance == Some(raw.damage_type);
    let mut vulnerable = false;
    for qualifier in qualifiers
        .iter()
        .filter(|q| q.matches(raw.damage_type, raw.attack_type))
    {
        match qualifier.kind {
            QualifierKind::Immunity => immune = true,
            QualifierKind::Resistance => resistant = true,
            QualifierKind::Vulnerability => vulnerable = true,
        }
    }

    if immune {
        return Ok(0);
    }

    let mut effective = points;
    if resistant {
        effective /= 2;
    }
    if vulnerable {
        effective = effective.saturating_mul(2);
    }
    Ok(effective)
}

/// Apply damage to a combatant and record the effective event.
///
/// On error the combatant is left untouched.
pub fn apply_damage(
    state: &mut CombatantState,
    raw: &RawDamage,
    qualifiers: &[DamageQualifier],
) -> Result<DamageEvent> {
    let points = match effective_points(raw, qualifiers, state.rolled_resistance) {
        Ok(points) => points,
        Err(err) => {
            warn!(combatant = %state.id, points = raw.points, "Rejected damage");
            return Err(err);
        }
    };

    let event = DamageEvent {
        points,
        damage_type: raw.damage_type,
    };
    state.record_damage(event);

    debug!(
        combatant = %state.id,
        raw = raw.points,
        effective = points,
        damage_type = %raw.damage_type,
        "Applied damage"
    );
    Ok(event)
}
