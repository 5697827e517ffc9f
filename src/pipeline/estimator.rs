//! Fair-fight inversion
//!
//! The game's fairness multiplier `m` relates the two sides' strengths:
//! roughly `m = 1 + 0.375 * (defender / attacker)`. Knowing one side's
//! score and `m`, the other side's score follows.

/// Slope of the fairness multiplier over the strength ratio.
pub const FAIR_FIGHT_FACTOR: f64 = 0.375;

/// Multiplier value at which the formula saturates; an observation of
/// exactly this value only bounds the opponent's strength from below.
pub const ANOMALOUS_FAIR_FIGHT: f64 = 3.0;

/// Infer the unseen opponent's score from the known side's score and the
/// fairness multiplier.
///
/// Returns `None` when the inversion is undefined (`m == 1` divides by
/// zero on the defender branch and yields identically zero on the
/// attacker branch) or when the result carries no information (zero or
/// non-finite). Callers skip silently; this is never an error.
pub fn invert_fair_fight(
    known_score: f64,
    fair_fight: f64,
    known_is_defender: bool,
) -> Option<f64> {
    let slope = (fair_fight - 1.0) * FAIR_FIGHT_FACTOR;

    let estimate = if known_is_defender {
        if slope == 0.0 {
            return None;
        }
        known_score / slope
    } else {
        slope * known_score
    };

    (estimate != 0.0 && estimate.is_finite() && estimate > 0.0).then_some(estimate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defender_known_inverts_upwards() {
        // S = 100, m = 2: S' = 100 / 0.375 = 266.67
        let estimate = invert_fair_fight(100.0, 2.0, true).unwrap();
        assert!((estimate - 266.666_666).abs() < 1e-3);
    }

    #[test]
    fn attacker_known_scales_downwards() {
        // S = 100, m = 2: S' = 0.375 * 100 = 37.5
        let estimate = invert_fair_fight(100.0, 2.0, false).unwrap();
        assert!((estimate - 37.5).abs() < 1e-9);
    }

    #[test]
    fn unit_multiplier_yields_no_estimate() {
        assert!(invert_fair_fight(100.0, 1.0, true).is_none());
        assert!(invert_fair_fight(100.0, 1.0, false).is_none());
    }

    #[test]
    fn zero_known_score_yields_no_estimate() {
        assert!(invert_fair_fight(0.0, 2.0, true).is_none());
        assert!(invert_fair_fight(0.0, 2.0, false).is_none());
    }

    #[test]
    fn saturated_multiplier_still_inverts() {
        let estimate = invert_fair_fight(100.0, ANOMALOUS_FAIR_FIGHT, true).unwrap();
        assert!((estimate - 133.333_333).abs() < 1e-3);
    }
}
