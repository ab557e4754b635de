/// Betting-value math for American-odds prop offers.
///
/// American odds quote profit relative to a 100 unit stake:
///   -110 → risk 110 to win 100 (favourite)
///   +150 → risk 100 to win 150 (underdog)
///
/// Every function here is row-wise: it takes one offer's numbers and returns
/// one metric, so a table is scored by mapping over its rows. Invalid input
/// is rejected with a `MathError` instead of being coerced.
use crate::db::models::{Side, SimulationResult};
use crate::error::MathError;

/// Stake ceiling applied to the Kelly fraction. Full Kelly is too volatile
/// for model probabilities with this much estimation error; quarter Kelly is
/// a policy choice, not a derived constant.
pub const DEFAULT_KELLY_CAP: f64 = 0.25;

fn check_price(american_price: i32) -> Result<f64, MathError> {
    if american_price == 0 {
        return Err(MathError::ZeroPrice);
    }
    if american_price.abs() < 100 {
        return Err(MathError::PriceOutOfRange(american_price));
    }
    Ok(american_price as f64)
}

fn check_probability(p: f64) -> Result<f64, MathError> {
    if !p.is_finite() {
        return Err(MathError::NonFinite(p));
    }
    if !(0.0..=1.0).contains(&p) {
        return Err(MathError::ProbabilityOutOfRange(p));
    }
    Ok(p)
}

/// Convert an American price to the probability it encodes (vig included).
pub fn implied_probability(american_price: i32) -> Result<f64, MathError> {
    let price = check_price(american_price)?;
    if price < 0.0 {
        Ok(-price / (-price + 100.0))
    } else {
        Ok(100.0 / (price + 100.0))
    }
}

/// Net profit per unit staked when the bet wins.
pub fn win_amount(american_price: i32) -> Result<f64, MathError> {
    let price = check_price(american_price)?;
    if price > 0.0 {
        Ok(price / 100.0)
    } else {
        Ok(100.0 / price.abs())
    }
}

/// Edge = simulated probability of the offered side − implied probability.
pub fn edge_for_over_under(
    simulated: &SimulationResult,
    side: Side,
    implied_probability: f64,
) -> Result<f64, MathError> {
    let p = check_probability(simulated.probability_for(side))?;
    let implied = check_probability(implied_probability)?;
    Ok(p - implied)
}

/// Expected profit per unit stake: `p · win − (1 − p)`. Never below −1.
pub fn expected_value(simulated_probability: f64, american_price: i32) -> Result<f64, MathError> {
    let p = check_probability(simulated_probability)?;
    let win = win_amount(american_price)?;
    Ok(p * win - (1.0 - p))
}

/// Fractional Kelly stake `edge / win`, clamped to `[0, cap]`.
///
/// # Arguments
/// * `simulated_probability` – model probability of the offered side.
/// * `implied_probability`   – market probability from the price.
/// * `american_price`        – the offer's price.
/// * `cap`                   – stake ceiling, see [`DEFAULT_KELLY_CAP`].
///
/// Returns `0.0` when there is no edge.
pub fn suggested_kelly(
    simulated_probability: f64,
    implied_probability: f64,
    american_price: i32,
    cap: f64,
) -> Result<f64, MathError> {
    let p = check_probability(simulated_probability)?;
    let implied = check_probability(implied_probability)?;
    let cap = check_probability(cap)?;
    let win = win_amount(american_price)?;

    let f = (p - implied) / win;
    Ok(f.clamp(0.0, cap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sim(p_over: f64, p_under: f64) -> SimulationResult {
        SimulationResult { p_over, p_under }
    }

    #[test]
    fn test_implied_probability_examples() {
        assert_relative_eq!(implied_probability(-110).unwrap(), 110.0 / 210.0, epsilon = 1e-12);
        assert_relative_eq!(implied_probability(-110).unwrap(), 0.5238, epsilon = 1e-4);
        assert_relative_eq!(implied_probability(150).unwrap(), 0.40, epsilon = 1e-12);
        assert_relative_eq!(implied_probability(100).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_implied_probability_zero_price() {
        assert_eq!(implied_probability(0), Err(MathError::ZeroPrice));
    }

    #[test]
    fn test_implied_probability_rejects_sub_100_prices() {
        assert_eq!(implied_probability(50), Err(MathError::PriceOutOfRange(50)));
        assert_eq!(implied_probability(-50), Err(MathError::PriceOutOfRange(-50)));
        assert_eq!(implied_probability(99), Err(MathError::PriceOutOfRange(99)));
        assert_eq!(win_amount(-99), Err(MathError::PriceOutOfRange(-99)));
        assert!(implied_probability(100).is_ok());
        assert!(implied_probability(-100).is_ok());
    }

    #[test]
    fn test_implied_probability_bounds_and_monotonic() {
        let mut prev: Option<f64> = None;
        for price in (-2000i32..=2000).step_by(5) {
            let Ok(p) = implied_probability(price) else {
                assert!(price.abs() < 100, "price {} rejected", price);
                continue;
            };
            assert!(p > 0.0 && p < 1.0, "price {} gave {}", price, p);
            // Walking from heavy favourite towards long shot: non-increasing
            if let Some(prev) = prev {
                assert!(p <= prev + 1e-12, "price {} broke monotonicity", price);
            }
            prev = Some(p);
        }
        assert!(implied_probability(-300).unwrap() > implied_probability(-110).unwrap());
        assert!(implied_probability(-110).unwrap() > implied_probability(120).unwrap());
    }

    #[test]
    fn test_edge_worked_example() {
        let implied = implied_probability(-110).unwrap();
        let e = edge_for_over_under(&sim(0.60, 0.38), Side::Over, implied).unwrap();
        assert_relative_eq!(e, 0.0762, epsilon = 1e-4);
    }

    #[test]
    fn test_edge_selects_side() {
        let e = edge_for_over_under(&sim(0.60, 0.30), Side::Under, 0.5).unwrap();
        assert_relative_eq!(e, -0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_edge_antisymmetric() {
        for (a, b) in [(0.6, 0.5), (0.2, 0.7), (0.45, 0.45)] {
            let forward = edge_for_over_under(&sim(a, 0.0), Side::Over, b).unwrap();
            let backward = edge_for_over_under(&sim(b, 0.0), Side::Over, a).unwrap();
            assert_relative_eq!(forward, -backward, epsilon = 1e-12);
        }
        let zero = edge_for_over_under(&sim(0.45, 0.0), Side::Over, 0.45).unwrap();
        assert_relative_eq!(zero, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_edge_rejects_bad_probability() {
        assert_eq!(
            edge_for_over_under(&sim(1.2, 0.0), Side::Over, 0.5),
            Err(MathError::ProbabilityOutOfRange(1.2))
        );
        assert!(matches!(
            edge_for_over_under(&sim(0.5, 0.0), Side::Over, f64::NAN),
            Err(MathError::NonFinite(_))
        ));
    }

    #[test]
    fn test_expected_value_worked_example() {
        let ev = expected_value(0.60, -110).unwrap();
        assert_relative_eq!(ev, 0.60 * (100.0 / 110.0) - 0.40, epsilon = 1e-12);
        assert_relative_eq!(ev, 0.1455, epsilon = 1e-4);
    }

    #[test]
    fn test_expected_value_plus_money() {
        // 40% at +150 is exactly fair
        assert_relative_eq!(expected_value(0.40, 150).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_expected_value_floor_and_monotonic() {
        for price in [-1000, -250, -110, 100, 150, 900] {
            let mut prev = f64::NEG_INFINITY;
            for i in 0..=100 {
                let p = i as f64 / 100.0;
                let ev = expected_value(p, price).unwrap();
                assert!(ev >= -1.0 - 1e-12);
                assert!(ev >= prev);
                prev = ev;
            }
        }
        assert_relative_eq!(expected_value(0.0, -110).unwrap(), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_expected_value_errors() {
        assert_eq!(expected_value(0.5, 0), Err(MathError::ZeroPrice));
        assert_eq!(
            expected_value(-0.1, -110),
            Err(MathError::ProbabilityOutOfRange(-0.1))
        );
    }

    #[test]
    fn test_kelly_no_edge() {
        let stake = suggested_kelly(0.5, 0.5, 100, DEFAULT_KELLY_CAP).unwrap();
        assert_relative_eq!(stake, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_kelly_negative_edge_is_zero() {
        let stake = suggested_kelly(0.3, 0.5, 100, DEFAULT_KELLY_CAP).unwrap();
        assert_relative_eq!(stake, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_kelly_positive_edge() {
        // edge 0.1 at even money → 0.1
        let stake = suggested_kelly(0.6, 0.5, 100, DEFAULT_KELLY_CAP).unwrap();
        assert_relative_eq!(stake, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_kelly_clamped_to_cap() {
        let stake = suggested_kelly(0.99, 0.10, -110, DEFAULT_KELLY_CAP).unwrap();
        assert_relative_eq!(stake, DEFAULT_KELLY_CAP, epsilon = 1e-12);
        let stake = suggested_kelly(0.99, 0.10, -110, 1.0).unwrap();
        assert!(stake <= 1.0);
    }

    #[test]
    fn test_kelly_bounded_and_monotonic_in_edge() {
        for price in [-400, -110, 120, 300] {
            let implied = implied_probability(price).unwrap();
            let mut prev = 0.0;
            for i in 0..=100 {
                let p = i as f64 / 100.0;
                let k = suggested_kelly(p, implied, price, DEFAULT_KELLY_CAP).unwrap();
                assert!((0.0..=DEFAULT_KELLY_CAP).contains(&k));
                assert!(k >= prev);
                prev = k;
            }
        }
    }

    #[test]
    fn test_kelly_rejects_zero_price() {
        assert_eq!(
            suggested_kelly(0.6, 0.5, 0, DEFAULT_KELLY_CAP),
            Err(MathError::ZeroPrice)
        );
    }
}
