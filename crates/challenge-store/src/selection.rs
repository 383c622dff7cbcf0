// Weighted random selection (roulette-wheel sampling) and the penalty wheel.

use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::debug;

use crate::schema::{GameEntry, PenaltyEntry};

/// Anything with a selection weight. Non-finite and non-positive weights
/// are never selected.
pub trait Weighted {
    fn weight(&self) -> f64;
}

impl Weighted for PenaltyEntry {
    fn weight(&self) -> f64 {
        self.probability
    }
}

impl Weighted for GameEntry {
    fn weight(&self) -> f64 {
        self.weight
    }
}

#[cfg(test)]
impl Weighted for f64 {
    fn weight(&self) -> f64 {
        *self
    }
}

fn is_valid_weight(w: f64) -> bool {
    w.is_finite() && w > 0.0
}

/// Pick one candidate with probability proportional to its weight.
///
/// Returns `None` when no candidate has a finite positive weight (including
/// the empty slice). When rounding leaves the running draw above zero after
/// the walk, the last valid candidate is returned.
pub fn select_weighted<'a, T, R>(candidates: &'a [T], rng: &mut R) -> Option<&'a T>
where
    T: Weighted,
    R: Rng + ?Sized,
{
    let valid: Vec<&T> = candidates
        .iter()
        .filter(|c| is_valid_weight(c.weight()))
        .collect();
    let last = *valid.last()?;

    let total: f64 = valid.iter().map(|c| c.weight()).sum();
    if !total.is_finite() {
        return Some(last);
    }
    let mut draw = rng.random_range(0.0..total);
    debug!(total, draw, candidates = valid.len(), "weighted draw");

    for candidate in valid {
        draw -= candidate.weight();
        if draw <= 0.0 {
            return Some(candidate);
        }
    }
    Some(last)
}

/// Outcome of one penalty-wheel spin.
#[derive(Debug, Clone, PartialEq)]
pub struct PenaltyAssignment<'a, P> {
    pub player: &'a str,
    pub penalty: &'a P,
}

/// Spin the player wheel (uniform over non-blank names), then the penalty
/// wheel (weighted). `None` if either wheel has nothing to land on.
pub fn spin<'a, P, R>(players: &'a [String], penalties: &'a [P], rng: &mut R) -> Option<PenaltyAssignment<'a, P>>
where
    P: Weighted,
    R: Rng + ?Sized,
{
    let names: Vec<&str> = players
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    let player = *names.choose(&mut *rng)?;
    let penalty = select_weighted(penalties, rng)?;
    Some(PenaltyAssignment { player, penalty })
}
