//! P-values of the built-in enrichment tests

use statrs::distribution::{ContinuousCDF, DiscreteCDF, Hypergeometric, Normal};

/// Probability of drawing at least `overlap` marked features
///
/// `universe` features of which `marked` are selected; the set has `size`
/// members in the universe. An empty overlap has p-value 1.
pub fn hypergeometric_upper_tail(universe: u64, marked: u64, size: u64, overlap: u64) -> f64 {
    if overlap == 0 {
        return 1.0;
    }
    match Hypergeometric::new(universe, marked, size) {
        Ok(dist) => dist.sf(overlap - 1).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

/// Two-sided p-value of a standard normal statistic
pub fn two_sided_z_pvalue(z: f64) -> f64 {
    if !z.is_finite() {
        return f64::NAN;
    }
    match Normal::new(0.0, 1.0) {
        Ok(normal) => 2.0 * normal.cdf(-z.abs()),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hypergeometric_tail() {
        // all 3 selected features fall in a 3-member set out of 10
        let p = hypergeometric_upper_tail(10, 3, 3, 3);
        assert!((p - 1.0 / 120.0).abs() < 1e-10);
        assert_eq!(hypergeometric_upper_tail(10, 3, 3, 0), 1.0);
        // at least one hit out of a set covering the whole universe is certain
        assert!((hypergeometric_upper_tail(10, 3, 10, 1) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_z_pvalue() {
        assert!((two_sided_z_pvalue(0.0) - 1.0).abs() < 1e-10);
        assert!((two_sided_z_pvalue(1.96) - 0.05).abs() < 1e-3);
        assert!((two_sided_z_pvalue(2.0) - two_sided_z_pvalue(-2.0)).abs() < 1e-12);
        assert!(two_sided_z_pvalue(f64::NAN).is_nan());
    }
}
