//! Descriptive statistics used by the statistical dimensions.
//!
//! All functions are total: empty or degenerate input yields `None`
//! rather than NaN, so callers decide what a missing statistic means.

/// Arithmetic mean
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance
pub fn variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(sum_sq / values.len() as f64)
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(f64::sqrt)
}

/// Standard deviation relative to the absolute mean.
///
/// `None` when the mean is zero.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if m.abs() < f64::EPSILON {
        return None;
    }
    Some(std_dev(values)? / m.abs())
}

/// Pearson correlation coefficient in [-1.0, 1.0].
///
/// `None` for mismatched lengths, fewer than two points, or a constant series.
pub fn pearson_correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom < f64::EPSILON {
        return None;
    }
    Some((cov / denom).clamp(-1.0, 1.0))
}

/// Herfindahl-Hirschman index of a set of counts (sum of squared shares).
///
/// Ranges from `1/n` (even) to 1.0 (single category).
pub fn herfindahl_index(counts: &[f64]) -> Option<f64> {
    let total: f64 = counts.iter().filter(|c| **c > 0.0).sum();
    if total <= 0.0 {
        return None;
    }
    Some(
        counts
            .iter()
            .filter(|c| **c > 0.0)
            .map(|c| (c / total).powi(2))
            .sum(),
    )
}

/// HHI rescaled to [0.0, 1.0] so that an even spread is 0 and a single
/// category is 1
pub fn normalized_herfindahl(counts: &[f64]) -> Option<f64> {
    let hhi = herfindahl_index(counts)?;
    let n = counts.iter().filter(|c| **c > 0.0).count() as f64;
    if n <= 1.0 {
        return Some(1.0);
    }
    Some(((hhi - 1.0 / n) / (1.0 - 1.0 / n)).clamp(0.0, 1.0))
}

/// Gini coefficient of non-negative values in [0.0, 1.0]
pub fn gini_coefficient(values: &[f64]) -> Option<f64> {
    if values.is_empty() || values.iter().any(|v| *v < 0.0 || !v.is_finite()) {
        return None;
    }
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return Some(0.0);
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len() as f64;
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64 + 1.0) * v)
        .sum();

    Some(((2.0 * weighted) / (n * total) - (n + 1.0) / n).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_mean_and_variance() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(approx(mean(&values).unwrap(), 5.0));
        assert!(approx(variance(&values).unwrap(), 4.0));
        assert!(approx(std_dev(&values).unwrap(), 2.0));
        assert!(approx(coefficient_of_variation(&values).unwrap(), 0.4));
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn test_cv_undefined_for_zero_mean() {
        assert!(coefficient_of_variation(&[-1.0, 1.0]).is_none());
    }

    #[test]
    fn test_pearson() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        assert!(approx(pearson_correlation(&xs, &[2.0, 4.0, 6.0, 8.0]).unwrap(), 1.0));
        assert!(approx(pearson_correlation(&xs, &[8.0, 6.0, 4.0, 2.0]).unwrap(), -1.0));
        assert!(pearson_correlation(&xs, &[3.0, 3.0, 3.0, 3.0]).is_none());
        assert!(pearson_correlation(&[1.0], &[1.0]).is_none());
    }

    #[test]
    fn test_herfindahl() {
        assert!(approx(herfindahl_index(&[1.0, 1.0, 1.0, 1.0]).unwrap(), 0.25));
        assert!(approx(herfindahl_index(&[10.0]).unwrap(), 1.0));
        assert!(approx(normalized_herfindahl(&[5.0, 5.0]).unwrap(), 0.0));
        assert!(approx(normalized_herfindahl(&[3.0]).unwrap(), 1.0));
        assert!(herfindahl_index(&[]).is_none());
    }

    #[test]
    fn test_gini() {
        assert!(approx(gini_coefficient(&[3.0, 3.0, 3.0]).unwrap(), 0.0));
        // One holder of everything among four: (n - 1) / n
        assert!(approx(gini_coefficient(&[0.0, 0.0, 0.0, 8.0]).unwrap(), 0.75));
        assert!(gini_coefficient(&[1.0, -1.0]).is_none());
        assert_eq!(gini_coefficient(&[0.0, 0.0]), Some(0.0));
    }
}
