//! Multiple testing correction over per-set p-values
//!
//! Non-finite p-values are carried through as NaN and do not count
//! towards the number of tests.

use std::cmp::Ordering;

/// Benjamini-Hochberg adjusted p-values, in input order
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let n = pvalues.len();
    let m = pvalues.iter().filter(|p| p.is_finite()).count();
    if m == 0 {
        return vec![f64::NAN; n];
    }

    // finite p-values ascending, the rest at the end
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| match (pvalues[a].is_finite(), pvalues[b].is_finite()) {
        (true, true) => pvalues[a].total_cmp(&pvalues[b]),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
    });

    let mut padj = vec![f64::NAN; n];
    let mut cummin = f64::INFINITY;
    for (rank, &i) in order[..m].iter().enumerate().rev() {
        let adj = (pvalues[i] * m as f64 / (rank + 1) as f64).min(1.0);
        cummin = cummin.min(adj);
        padj[i] = cummin;
    }
    padj
}

/// Bonferroni adjusted p-values
pub fn bonferroni(pvalues: &[f64]) -> Vec<f64> {
    let m = pvalues.iter().filter(|p| p.is_finite()).count();
    pvalues
        .iter()
        .map(|&p| if p.is_finite() { (p * m as f64).min(1.0) } else { f64::NAN })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bh_known_values() {
        let padj = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.02]);
        let expected = [0.04, 0.04, 0.04, 0.04];
        for (a, e) in padj.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-12);
        }

        let padj = benjamini_hochberg(&[0.001, 0.01, 0.05, 0.1]);
        for w in padj.windows(2) {
            assert!(w[0] <= w[1]);
        }
        assert!((padj[0] - 0.004).abs() < 1e-12);
        assert!((padj[3] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_bh_with_nan() {
        let padj = benjamini_hochberg(&[0.01, f64::NAN, 0.03, 0.02]);
        assert!(padj[1].is_nan());
        // three tests, not four
        assert!((padj[0] - 0.03).abs() < 1e-12);
        assert!(benjamini_hochberg(&[f64::NAN]).iter().all(|p| p.is_nan()));
        assert!(benjamini_hochberg(&[]).is_empty());
    }

    #[test]
    fn test_bonferroni() {
        let padj = bonferroni(&[0.01, 0.5, f64::NAN]);
        assert!((padj[0] - 0.02).abs() < 1e-12);
        assert_eq!(padj[1], 1.0);
        assert!(padj[2].is_nan());
    }
}
