//! Classification decision rule shared by every classifier

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Pick the label index from a prediction vector.
///
/// `preds[0]` is ignored; `preds[1..]` holds the class distribution. Binomial
/// models use `threshold` on the positive class. Otherwise the arg-max wins and
/// ties are broken deterministically from the row contents, weighted by
/// `prior` when present.
pub fn predicted_label(preds: &[f64], prior: Option<&[f64]>, row: &[f64], threshold: f64) -> usize {
    if preds.len() == 3 {
        return usize::from(preds[2] >= threshold);
    }

    let Some((_, dist)) = preds.split_first() else {
        return 0;
    };
    let Some(best) = dist.iter().copied().reduce(f64::max) else {
        return 0;
    };
    let ties: Vec<usize> = dist
        .iter()
        .enumerate()
        .filter(|&(_, &p)| p == best)
        .map(|(i, _)| i)
        .collect();
    match ties.as_slice() {
        [] => argmax(dist),
        [only] => *only,
        _ => break_tie(&ties, prior, row_seed(row)),
    }
}

// Reached only when the distribution holds NaN
fn argmax(dist: &[f64]) -> usize {
    dist.iter()
        .enumerate()
        .filter(|(_, p)| !p.is_nan())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Seed derived from the raw bits of every value in the row
pub fn row_seed(row: &[f64]) -> i64 {
    row.iter()
        .fold(0i64, |hash, v| hash ^ ((v.to_bits() as i64) >> 6))
}

fn break_tie(ties: &[usize], prior: Option<&[f64]>, seed: i64) -> usize {
    if let Some(prior) = prior {
        let total: f64 = ties.iter().filter_map(|&t| prior.get(t)).sum();
        if total > 0.0 {
            let mut rng = StdRng::seed_from_u64(seed as u64);
            let draw: f64 = rng.gen();
            let mut cumulative = 0.0;
            for &t in ties {
                cumulative += prior.get(t).copied().unwrap_or(0.0) / total;
                if draw <= cumulative {
                    return t;
                }
            }
            return ties[ties.len() - 1];
        }
    }
    ties[seed.rem_euclid(ties.len() as i64) as usize]
}

/// Undo class balancing applied at training time.
///
/// Each class probability in `preds[1..]` is scaled by `prior / model` and the
/// distribution is renormalized. Classes where either rate is zero keep their value.
pub fn correct_probabilities(preds: &mut [f64], prior: &[f64], model_distrib: &[f64]) {
    let Some((_, dist)) = preds.split_first_mut() else {
        return;
    };
    let mut sum = 0.0;
    for (i, p) in dist.iter_mut().enumerate() {
        let (Some(&pr), Some(&md)) = (prior.get(i), model_distrib.get(i)) else {
            continue;
        };
        if pr != 0.0 && md != 0.0 {
            *p *= pr / md;
        }
        sum += *p;
    }
    if sum > 0.0 {
        for p in dist.iter_mut() {
            *p /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_binomial_threshold() {
        assert_eq!(predicted_label(&[0.0, 0.4, 0.6], None, &[], 0.5), 1);
        assert_eq!(predicted_label(&[0.0, 0.6, 0.4], None, &[], 0.5), 0);
        assert_eq!(predicted_label(&[0.0, 0.6, 0.4], None, &[], 0.4), 1);
        assert_eq!(predicted_label(&[0.0, 0.7, 0.3], None, &[], 0.3), 1);
    }

    #[test]
    fn test_multinomial_argmax() {
        assert_eq!(predicted_label(&[0.0, 0.2, 0.5, 0.3], None, &[1.0], 0.5), 1);
        assert_eq!(predicted_label(&[0.0, 0.1, 0.1, 0.8], None, &[1.0], 0.5), 2);
        assert_eq!(predicted_label(&[0.0, 1.0], None, &[], 0.5), 0);
    }

    #[test]
    fn test_ties_are_deterministic_and_valid() {
        let preds = [0.0, 0.4, 0.4, 0.2];
        for row in [[1.0, 2.0], [3.5, -1.0], [0.0, 0.0]] {
            let a = predicted_label(&preds, None, &row, 0.5);
            let b = predicted_label(&preds, None, &row, 0.5);
            assert_eq!(a, b);
            assert!(a == 0 || a == 1);

            let prior = [0.5, 0.3, 0.2];
            let c = predicted_label(&preds, Some(&prior[..]), &row, 0.5);
            assert_eq!(c, predicted_label(&preds, Some(&prior[..]), &row, 0.5));
            assert!(c == 0 || c == 1);
        }
    }

    #[test]
    fn test_tie_without_prior_uses_row_seed() {
        // An all-zero row seeds 0, which picks the first tied class
        assert_eq!(predicted_label(&[0.0, 0.25, 0.5, 0.5], None, &[0.0], 0.5), 1);
    }

    #[test]
    fn test_tie_prior_zero_weight_never_chosen() {
        let preds = [0.0, 0.5, 0.5, 0.0];
        for seed in 0..32 {
            let row = [seed as f64];
            assert_eq!(predicted_label(&preds, Some(&[0.0, 1.0, 0.0][..]), &row, 0.5), 1);
        }
    }

    #[test]
    fn test_row_seed() {
        assert_eq!(row_seed(&[]), 0);
        assert_eq!(row_seed(&[0.0]), 0);
        assert_eq!(row_seed(&[1.0]), (1.0f64.to_bits() as i64) >> 6);
    }

    #[test]
    fn test_correct_probabilities() {
        let mut preds = [0.0, 0.5, 0.5];
        correct_probabilities(&mut preds, &[0.9, 0.1], &[0.5, 0.5]);
        assert_abs_diff_eq!(preds[1], 0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(preds[2], 0.1, epsilon = 1e-12);
        assert_eq!(preds[0], 0.0);

        let mut preds = [0.0, 0.6, 0.4];
        correct_probabilities(&mut preds, &[0.5, 0.5], &[0.5, 0.5]);
        assert_abs_diff_eq!(preds[1], 0.6, epsilon = 1e-12);
    }
}
