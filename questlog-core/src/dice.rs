//! Hit dice expressions.
//!
//! Supports the notation monster stat blocks use for hit dice: `XdY+Z`,
//! optionally with several dice terms (`2d8+1d6-1`). Monsters without a
//! fixed hit point value take the expression's average.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for dice parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
}

/// Standard D&D die types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// A group of identical dice, e.g. the `4d8` of `4d8+8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceTerm {
    pub count: u32,
    pub die_type: DieType,
    pub negative: bool,
}

impl DiceTerm {
    /// Average of this term, rounded down the way stat blocks print it.
    pub fn average(&self) -> i32 {
        let value = (self.count * (self.die_type.sides() + 1) / 2) as i32;
        if self.negative {
            -value
        } else {
            value
        }
    }
}

/// A complete dice expression (e.g., 4d8+8).
///
/// Serialized as its notation string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DiceExpression {
    pub terms: Vec<DiceTerm>,
    pub modifier: i32,
}

impl DiceExpression {
    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut terms = Vec::new();
        let mut modifier: i32 = 0;
        let mut current = String::new();
        let mut negative = false;

        for ch in notation.chars() {
            match ch {
                '+' | '-' => {
                    if !current.is_empty() {
                        Self::parse_term(&current, negative, &mut terms, &mut modifier)?;
                        current.clear();
                    }
                    negative = ch == '-';
                }
                ' ' => continue,
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            Self::parse_term(&current, negative, &mut terms, &mut modifier)?;
        }

        if terms.is_empty() && modifier == 0 {
            return Err(DiceError::NoDice);
        }

        Ok(DiceExpression { terms, modifier })
    }

    fn parse_term(
        s: &str,
        negative: bool,
        terms: &mut Vec<DiceTerm>,
        modifier: &mut i32,
    ) -> Result<(), DiceError> {
        if let Some(d_pos) = s.find('d') {
            let count_str = &s[..d_pos];
            let count: u32 = if count_str.is_empty() {
                1
            } else {
                count_str
                    .parse()
                    .map_err(|_| DiceError::InvalidNotation(s.to_string()))?
            };

            let sides: u32 = s[d_pos + 1..]
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
            let die_type = DieType::from_sides(sides).ok_or(DiceError::InvalidDieSize(sides))?;

            terms.push(DiceTerm {
                count,
                die_type,
                negative,
            });
        } else {
            let value: i32 = s
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
            *modifier += if negative { -value } else { value };
        }

        Ok(())
    }

    /// Average value of the expression, as printed in stat blocks.
    pub fn average(&self) -> i32 {
        self.terms.iter().map(DiceTerm::average).sum::<i32>() + self.modifier
    }

    /// Roll the expression with the given RNG.
    pub fn roll_with_rng<R: Rng>(&self, rng: &mut R) -> i32 {
        let dice_total: i32 = self
            .terms
            .iter()
            .map(|term| {
                let subtotal: i32 = (0..term.count)
                    .map(|_| rng.gen_range(1..=term.die_type.sides()) as i32)
                    .sum();
                if term.negative {
                    -subtotal
                } else {
                    subtotal
                }
            })
            .sum();
        dice_total + self.modifier
    }
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl TryFrom<String> for DiceExpression {
    type Error = DiceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        DiceExpression::parse(&s)
    }
}

impl From<DiceExpression> for String {
    fn from(expr: DiceExpression) -> String {
        expr.to_string()
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for term in &self.terms {
            if term.negative {
                write!(f, "-")?;
            } else if !first {
                write!(f, "+")?;
            }
            write!(f, "{}{}", term.count, term.die_type)?;
            first = false;
        }
        if self.modifier > 0 && !first {
            write!(f, "+{}", self.modifier)?;
        } else if self.modifier != 0 || first {
            write!(f, "{}", self.modifier)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_simple() {
        let expr = DiceExpression::parse("4d8").unwrap();
        assert_eq!(expr.terms.len(), 1);
        assert_eq!(expr.terms[0].count, 4);
        assert_eq!(expr.terms[0].die_type, DieType::D8);
        assert_eq!(expr.modifier, 0);
    }

    #[test]
    fn test_parse_with_modifier() {
        let expr = DiceExpression::parse("2d10 - 2").unwrap();
        assert_eq!(expr.modifier, -2);
        assert_eq!(expr.to_string(), "2d10-2");
    }

    #[test]
    fn test_invalid_notation() {
        assert_eq!(DiceExpression::parse(""), Err(DiceError::NoDice));
        assert_eq!(
            DiceExpression::parse("3d7"),
            Err(DiceError::InvalidDieSize(7))
        );
        assert!(matches!(
            DiceExpression::parse("xd6"),
            Err(DiceError::InvalidNotation(_))
        ));
    }

    #[test]
    fn test_average_matches_stat_blocks() {
        // Goblin: 2d6 -> 7
        assert_eq!(DiceExpression::parse("2d6").unwrap().average(), 7);
        // Ogre: 7d10+21 -> 59
        assert_eq!(DiceExpression::parse("7d10+21").unwrap().average(), 59);
        // Odd dice round down: 1d8 -> 4
        assert_eq!(DiceExpression::parse("1d8").unwrap().average(), 4);
        // Bare values
        assert_eq!(DiceExpression::parse("5").unwrap().average(), 5);
    }

    #[test]
    fn test_roll_range() {
        let expr = DiceExpression::parse("3d6+1").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let total = expr.roll_with_rng(&mut rng);
            assert!((4..=19).contains(&total));
        }
    }

    #[test]
    fn test_serializes_as_notation() {
        let expr = DiceExpression::parse("7d10+21").unwrap();
        let json = serde_json::to_string(&expr).unwrap();
        assert_eq!(json, "\"7d10+21\"");
        let back: DiceExpression = serde_json::from_str(&json).unwrap();
        assert_eq!(back, expr);
    }
}
