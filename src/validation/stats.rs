// Reaction Guard: small statistics helpers shared by the detectors

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0.0 for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Coefficient of variation (stddev / mean), the scale-independent
/// consistency measure. 0.0 when the mean is zero.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m == 0.0 {
        return 0.0;
    }
    std_dev(values) / m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[250.0]), 250.0);
        assert_eq!(mean(&[200.0, 300.0]), 250.0);

        assert_eq!(std_dev(&[250.0]), 0.0);
        assert_eq!(std_dev(&[250.0, 250.0, 250.0]), 0.0);
        assert!((std_dev(&[200.0, 300.0]) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_coefficient_of_variation() {
        assert_eq!(coefficient_of_variation(&[]), 0.0);
        let tight = [250.0, 251.0, 249.0, 250.0, 250.0, 251.0, 249.0, 250.0];
        assert!(coefficient_of_variation(&tight) < 0.01);
        let loose = [180.0, 320.0, 240.0, 400.0, 210.0, 290.0];
        assert!(coefficient_of_variation(&loose) > 0.2);
    }
}
