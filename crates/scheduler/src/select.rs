// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Weighted random selection without replacement over eligible
//! ensembles: one id is drawn per Selecting step,
//! weighted by `Properties::effective_priority`, with ties broken by
//! natural (ascending byte-order) id order so the draw is reproducible
//! given a fixed RNG seed.

use joshua_core::{EnsembleId, Properties};
use rand::Rng;

/// Draw one id from `candidates`, weighted by each entry's
/// `effective_priority`. Non-positive priorities are excluded up front
/// by the caller (`Properties::is_eligible`); returns `None` only if
/// `candidates` is empty or every weight is zero.
pub fn select_weighted(candidates: &[(EnsembleId, Properties)], rng: &mut impl Rng) -> Option<EnsembleId> {
    let mut pool: Vec<(EnsembleId, u64)> = candidates
        .iter()
        .filter(|(_, props)| props.is_eligible())
        .map(|(id, props)| (*id, props.effective_priority() as u64))
        .collect();
    pool.sort_by_key(|(id, _)| *id);

    let total: u64 = pool.iter().map(|(_, w)| w).sum();
    if total == 0 {
        return None;
    }

    let mut point = rng.gen_range(0..total);
    for (id, weight) in pool {
        if point < weight {
            return Some(id);
        }
        point -= weight;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn props_with_priority(priority: i64) -> Properties {
        let mut p = Properties::for_test("a");
        p.priority = priority;
        p
    }

    #[test]
    fn empty_candidates_select_none() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(select_weighted(&[], &mut rng), None);
    }

    #[test]
    fn all_ineligible_candidates_select_none() {
        let candidates = vec![
            (EnsembleId::from_bytes([1; 10]), props_with_priority(0)),
            (EnsembleId::from_bytes([2; 10]), props_with_priority(-5)),
        ];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(select_weighted(&candidates, &mut rng), None);
    }

    #[test]
    fn single_eligible_candidate_is_always_selected() {
        let id = EnsembleId::from_bytes([1; 10]);
        let candidates = vec![
            (id, props_with_priority(100)),
            (EnsembleId::from_bytes([2; 10]), props_with_priority(0)),
        ];
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            assert_eq!(select_weighted(&candidates, &mut rng), Some(id));
        }
    }

    #[test]
    fn selection_is_deterministic_for_a_fixed_seed() {
        let candidates = vec![
            (EnsembleId::from_bytes([1; 10]), props_with_priority(10)),
            (EnsembleId::from_bytes([2; 10]), props_with_priority(90)),
        ];
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        assert_eq!(
            select_weighted(&candidates, &mut rng_a),
            select_weighted(&candidates, &mut rng_b)
        );
    }

    #[test]
    fn higher_weight_wins_more_often_over_many_draws() {
        let heavy = EnsembleId::from_bytes([1; 10]);
        let light = EnsembleId::from_bytes([2; 10]);
        let candidates = vec![(heavy, props_with_priority(950)), (light, props_with_priority(50))];
        let mut rng = StdRng::seed_from_u64(7);
        let mut heavy_wins = 0;
        for _ in 0..1000 {
            if select_weighted(&candidates, &mut rng) == Some(heavy) {
                heavy_wins += 1;
            }
        }
        assert!(heavy_wins > 800, "expected heavy weight to dominate, got {heavy_wins}/1000");
    }
}
