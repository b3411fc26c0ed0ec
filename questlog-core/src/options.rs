//! Trait option resolution.
//!
//! Some monster traits vary between individuals: a bandit might be any
//! non-lawful alignment, a dragon-touched creature resistant to one of
//! several damage types. Each possibility is a [`TraitOption`] owned by the
//! monster template. When a combatant is created from the template one
//! option is picked at random, either uniformly or by the options' weights.

use crate::error::{CoreError, Result};
use crate::rules::RuleType;
use crate::world::{MonsterId, OptionId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default allowed drift of a weighted set's sum from 1.0.
pub const DEFAULT_WEIGHT_TOLERANCE: f64 = 1e-6;

/// One possible value of a variable monster trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitOption<T> {
    pub id: OptionId,
    pub monster: MonsterId,
    pub value: T,
    /// Relative probability in `[0, 1]`. Either every option of a set has
    /// a weight or none does.
    pub weight: Option<f64>,
}

impl<T: RuleType> TraitOption<T> {
    /// Create an unweighted option.
    pub fn new(monster: MonsterId, value: T) -> Self {
        Self {
            id: OptionId::new(),
            monster,
            value,
            weight: None,
        }
    }

    /// Create a weighted option.
    pub fn weighted(monster: MonsterId, value: T, weight: f64) -> Self {
        Self {
            id: OptionId::new(),
            monster,
            value,
            weight: Some(weight),
        }
    }
}

/// How a set of options is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightMode {
    /// No option has a weight; each is equally likely.
    Uniform,
    /// Every option has a weight.
    Weighted,
}

/// Determine the weighting of an option set without checking the weights
/// themselves.
pub fn weight_mode<T: RuleType>(options: &[TraitOption<T>]) -> Result<WeightMode> {
    if options.is_empty() {
        return Err(CoreError::conflict(
            "TraitOption",
            format!("no {} options to choose from", T::KIND),
        ));
    }

    let weighted = options.iter().filter(|o| o.weight.is_some()).count();
    if weighted == 0 {
        Ok(WeightMode::Uniform)
    } else if weighted == options.len() {
        Ok(WeightMode::Weighted)
    } else {
        Err(CoreError::inconsistent(format!(
            "{} of {} {} options are weighted",
            weighted,
            options.len(),
            T::KIND
        )))
    }
}

/// Validate an option set before it is committed.
///
/// A weighted set must have every weight in `[0, 1]` and sum to 1.0 within
/// `tolerance`.
pub fn validate<T: RuleType>(options: &[TraitOption<T>], tolerance: f64) -> Result<WeightMode> {
    let mode = weight_mode(options)?;
    if mode == WeightMode::Uniform {
        return Ok(mode);
    }

    let mut sum = 0.0;
    for option in options {
        let weight = option.weight.unwrap_or_default();
        if !(0.0..=1.0).contains(&weight) {
            warn!(kind = T::KIND, value = %option.value, weight, "Rejected option weight");
            return Err(CoreError::inconsistent(format!(
                "weight {} of {} is outside [0, 1]",
                weight, option.value
            )));
        }
        sum += weight;
    }

    if (sum - 1.0).abs() > tolerance {
        warn!(kind = T::KIND, sum, "Rejected option weights");
        return Err(CoreError::inconsistent(format!(
            "{} weights sum to {}, not 1",
            T::KIND,
            sum
        )));
    }

    Ok(mode)
}

/// Pick one value from an option set.
///
/// Weighted sets are drawn by weight, normalized by their actual sum.
pub fn resolve<T: RuleType, R: Rng>(options: &[TraitOption<T>], rng: &mut R) -> Result<T> {
    let mode = weight_mode(options)?;

    let chosen = match mode {
        WeightMode::Uniform => options[rng.gen_range(0..options.len())].value,
        WeightMode::Weighted => {
            let total: f64 = options.iter().filter_map(|o| o.weight).sum();
            if !total.is_finite() || total <= 0.0 {
                return Err(CoreError::inconsistent(format!(
                    "{} weights sum to {}",
                    T::KIND,
                    total
                )));
            }

            let target = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            let mut chosen = None;
            for option in options {
                cumulative += option.weight.unwrap_or_default();
                if target < cumulative {
                    chosen = Some(option.value);
                    break;
                }
            }

            // Rounding can leave target at the very top of the range.
            match chosen {
                Some(value) => value,
                None => options
                    .iter()
                    .rev()
                    .find(|o| o.weight.unwrap_or_default() > 0.0)
                    .map(|o| o.value)
                    .ok_or_else(|| CoreError::inconsistent("no option has a positive weight"))?,
            }
        }
    };

    debug!(kind = T::KIND, ?mode, value = %chosen, "Resolved trait option");
    Ok(chosen)
}

/// Pick one value using the thread-local RNG.
pub fn resolve_random<T: RuleType>(options: &[TraitOption<T>]) -> Result<T> {
    resolve(options, &mut rand::thread_rng())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Alignment, DamageType};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn uniform(values: &[Alignment]) -> Vec<TraitOption<Alignment>> {
        let monster = MonsterId::new();
        values.iter().map(|&v| TraitOption::new(monster, v)).collect()
    }

    fn weighted(values: &[(Alignment, f64)]) -> Vec<TraitOption<Alignment>> {
        let monster = MonsterId::new();
        values
            .iter()
            .map(|&(v, w)| TraitOption::weighted(monster, v, w))
            .collect()
    }

    #[test]
    fn test_validate_modes() {
        let set = uniform(&[Alignment::ChaoticEvil, Alignment::NeutralEvil]);
        assert_eq!(validate(&set, 1e-6), Ok(WeightMode::Uniform));

        let set = weighted(&[(Alignment::ChaoticEvil, 0.75), (Alignment::NeutralEvil, 0.25)]);
        assert_eq!(validate(&set, 1e-6), Ok(WeightMode::Weighted));
    }

    #[test]
    fn test_validate_rejects_bad_sums() {
        let set = weighted(&[(Alignment::ChaoticEvil, 0.5), (Alignment::NeutralEvil, 0.4)]);
        assert!(matches!(
            validate(&set, 1e-6),
            Err(CoreError::InconsistentWeighting { .. })
        ));

        let set = weighted(&[(Alignment::ChaoticEvil, 1.5), (Alignment::NeutralEvil, -0.5)]);
        assert!(matches!(
            validate(&set, 1e-6),
            Err(CoreError::InconsistentWeighting { .. })
        ));
    }

    #[test]
    fn test_validate_tolerates_float_drift() {
        let set = weighted(&[
            (Alignment::LawfulGood, 0.1),
            (Alignment::NeutralGood, 0.2),
            (Alignment::ChaoticGood, 0.7 + 1e-9),
        ]);
        assert!(validate(&set, DEFAULT_WEIGHT_TOLERANCE).is_ok());
    }

    #[test]
    fn test_mixed_weighting_rejected() {
        let monster = MonsterId::new();
        let set = vec![
            TraitOption::weighted(monster, Alignment::ChaoticEvil, 1.0),
            TraitOption::new(monster, Alignment::NeutralEvil),
        ];
        assert!(matches!(
            validate(&set, 1e-6),
            Err(CoreError::InconsistentWeighting { .. })
        ));

        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            resolve(&set, &mut rng),
            Err(CoreError::InconsistentWeighting { .. })
        ));
    }

    #[test]
    fn test_empty_set() {
        let set: Vec<TraitOption<Alignment>> = Vec::new();
        assert!(matches!(
            validate(&set, 1e-6),
            Err(CoreError::ValidationConflict { .. })
        ));
        assert!(resolve_random(&set).is_err());
    }

    #[test]
    fn test_uniform_frequency() {
        let values = [
            Alignment::LawfulEvil,
            Alignment::NeutralEvil,
            Alignment::ChaoticEvil,
            Alignment::ChaoticNeutral,
        ];
        let set = uniform(&values);
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts: HashMap<Alignment, u32> = HashMap::new();

        for _ in 0..10_000 {
            *counts.entry(resolve(&set, &mut rng).unwrap()).or_default() += 1;
        }

        for value in values {
            let share = counts.get(&value).copied().unwrap_or(0) as f64 / 10_000.0;
            assert!((0.23..=0.27).contains(&share), "{value}: {share}");
        }
    }

    #[test]
    fn test_weighted_frequency() {
        let set = weighted(&[(Alignment::ChaoticEvil, 0.75), (Alignment::NeutralEvil, 0.25)]);
        let mut rng = StdRng::seed_from_u64(9);
        let evil = (0..10_000)
            .filter(|_| resolve(&set, &mut rng).unwrap() == Alignment::ChaoticEvil)
            .count() as f64
            / 10_000.0;
        assert!((0.72..=0.78).contains(&evil), "{evil}");
    }

    #[test]
    fn test_zero_weight_never_chosen() {
        let monster = MonsterId::new();
        let set = vec![
            TraitOption::weighted(monster, DamageType::Fire, 0.0),
            TraitOption::weighted(monster, DamageType::Cold, 1.0),
        ];
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            assert_eq!(resolve(&set, &mut rng).unwrap(), DamageType::Cold);
        }
    }

    proptest! {
        #[test]
        fn prop_normalized_weights_validate_and_resolve(
            raw in prop::collection::vec(0.01f64..1.0, 1..8),
            seed in any::<u64>(),
        ) {
            let total: f64 = raw.iter().sum();
            let monster = MonsterId::new();
            let set: Vec<_> = raw
                .iter()
                .zip(Alignment::all())
                .map(|(w, &v)| TraitOption::weighted(monster, v, w / total))
                .collect();

            prop_assert_eq!(validate(&set, DEFAULT_WEIGHT_TOLERANCE), Ok(WeightMode::Weighted));

            let mut rng = StdRng::seed_from_u64(seed);
            let chosen = resolve(&set, &mut rng).unwrap();
            prop_assert!(set.iter().any(|o| o.value == chosen));
        }
    }
}
