use crate::utils::l2_norm_f32;

/// Distance between the batch means of two sets of feature vectors, raised
/// to a configurable order: `‖mean(a) − mean(b)‖₂ ^ order`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureDistance {
    pub order: f32,
}

/// Value of a feature distance together with its gradient with respect to
/// each individual feature vector of both sides.
#[derive(Clone, Debug)]
pub struct FeatureDistanceResult {
    pub distance: f32,
    pub gradients_a: Vec<Vec<f32>>,
    pub gradients_b: Vec<Vec<f32>>,
}

pub fn mean_features<T: AsRef<[f32]>>(features: &[T]) -> Vec<f32> {
    assert!(!features.is_empty());
    let size = features[0].as_ref().len();
    let mut mean = vec![0f32; size];
    for feature in features {
        let feature = feature.as_ref();
        debug_assert_eq!(feature.len(), size);
        for (m, f) in mean.iter_mut().zip(feature.iter()) {
            *m += *f;
        }
    }
    let n = features.len() as f32;
    for m in mean.iter_mut() {
        *m /= n;
    }
    mean
}

impl FeatureDistance {

    pub fn with_order(order: f32) -> Self {
        FeatureDistance { order }
    }

    /// Distance and its gradient with respect to `mean_a`; the gradient
    /// with respect to `mean_b` is its negation.
    pub fn between_means(&self, mean_a: &[f32], mean_b: &[f32]) -> (f32, Vec<f32>) {
        assert_eq!(mean_a.len(), mean_b.len());
        let delta: Vec<f32> = mean_a.iter().zip(mean_b.iter()).map(|(a, b)| a - b).collect();
        let norm = l2_norm_f32(&delta);
        let distance = norm.powf(self.order);
        if norm == 0.0 {
            // the subgradient at zero is taken as zero for every order
            return (distance, vec![0.0; delta.len()]);
        }
        let factor = self.order * norm.powf(self.order - 1.0) / norm;
        (distance, delta.iter().map(|d| d * factor).collect())
    }

    pub fn between<A: AsRef<[f32]>, B: AsRef<[f32]>>(&self, a: &[A], b: &[B]) -> FeatureDistanceResult {
        let (distance, mean_gradient) = self.between_means(&mean_features(a), &mean_features(b));
        let scale_a = 1.0 / a.len() as f32;
        let scale_b = -1.0 / b.len() as f32;
        FeatureDistanceResult {
            distance,
            gradients_a: vec![mean_gradient.iter().map(|g| g * scale_a).collect(); a.len()],
            gradients_b: vec![mean_gradient.iter().map(|g| g * scale_b).collect(); b.len()],
        }
    }

}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mean_features() {
        let mean = mean_features(&[vec![1.0, 2.0], vec![3.0, 6.0]]);
        assert_eq!(mean, vec![2.0, 4.0]);
    }

    #[test]
    fn test_orders() {
        let a = [vec![3.0f32, 0.0]];
        let b = [vec![0.0f32, 4.0]];
        assert!((FeatureDistance::with_order(1.0).between(&a, &b).distance - 5.0).abs() < 1e-6);
        assert!((FeatureDistance::with_order(2.0).between(&a, &b).distance - 25.0).abs() < 1e-4);
        assert!((FeatureDistance::with_order(0.5).between(&a, &b).distance - 5f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let distance_fn = FeatureDistance::with_order(1.5);
        let a = vec![vec![0.5f32, -1.0, 2.0], vec![1.5, 0.0, -1.0]];
        let b = vec![vec![0.0f32, 0.3, 0.2]];
        let result = distance_fn.between(&a, &b);
        let h = 1e-2;
        for i in 0..3 {
            let mut plus = a.clone();
            plus[1][i] += h;
            let mut minus = a.clone();
            minus[1][i] -= h;
            let numeric = (distance_fn.between(&plus, &b).distance - distance_fn.between(&minus, &b).distance) / (2.0 * h);
            assert!((numeric - result.gradients_a[1][i]).abs() < 1e-2);
        }
        for i in 0..3 {
            let mut plus = b.clone();
            plus[0][i] += h;
            let mut minus = b.clone();
            minus[0][i] -= h;
            let numeric = (distance_fn.between(&a, &plus).distance - distance_fn.between(&a, &minus).distance) / (2.0 * h);
            assert!((numeric - result.gradients_b[0][i]).abs() < 1e-2);
        }
    }

    #[test]
    fn test_zero_distance_has_zero_gradient() {
        let a = [vec![1.0f32, 1.0]];
        let result = FeatureDistance::with_order(0.5).between(&a, &a);
        assert_eq!(result.distance, 0.0);
        assert!(result.gradients_a[0].iter().all(|g| *g == 0.0));
    }

}
