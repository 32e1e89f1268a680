use std::f64;

use rand::Rng;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::Result;

/// A univariate continuous distribution usable for inverse-transform
/// sampling.
pub trait ContinuousDistribution: Send {
    fn cdf(&self, x: f64) -> f64;
    fn inverse_cdf(&self, p: f64) -> f64;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalComponent {
    normal: Normal,
}

impl NormalComponent {

    pub fn new(mean: f64, std_dev: f64) -> Result<Self> {
        Ok(NormalComponent { normal: Normal::new(mean, std_dev)? })
    }

    pub fn standard() -> Result<Self> {
        NormalComponent::new(0.0, 1.0)
    }

}

impl ContinuousDistribution for NormalComponent {

    fn cdf(&self, x: f64) -> f64 {
        self.normal.cdf(x)
    }

    fn inverse_cdf(&self, p: f64) -> f64 {
        self.normal.inverse_cdf(p)
    }

}

/// Weighted mixture of continuous components. Each draw picks a component by
/// weight, then inverts that component's cdf at a uniform variate.
pub struct MixtureSampler {
    components: Vec<Box<dyn ContinuousDistribution>>,
    cumulative_weights: Vec<f64>,
}

impl MixtureSampler {

    /// Equal weights for every component.
    pub fn new(components: Vec<Box<dyn ContinuousDistribution>>) -> Self {
        let weights = vec![1.0; components.len()];
        MixtureSampler::with_weights(components, &weights)
    }

    pub fn with_weights(components: Vec<Box<dyn ContinuousDistribution>>, weights: &[f64]) -> Self {
        assert!(!components.is_empty());
        assert_eq!(components.len(), weights.len());
        let total: f64 = weights.iter().sum();
        assert!(total > 0.0);
        let mut running = 0.0;
        let cumulative_weights = weights.iter()
            .map(|w| {
                running += w / total;
                running
            })
            .collect();
        MixtureSampler { components, cumulative_weights }
    }

    pub fn standard_normal() -> Result<Self> {
        Ok(MixtureSampler::new(vec![Box::new(NormalComponent::standard()?)]))
    }

    /// `N(−offset, 1)` and `N(+offset, 1)` with equal weight.
    pub fn bimodal(offset: f64) -> Result<Self> {
        Ok(MixtureSampler::new(vec![
            Box::new(NormalComponent::new(-offset, 1.0)?),
            Box::new(NormalComponent::new(offset, 1.0)?),
        ]))
    }

    fn weight(&self, index: usize) -> f64 {
        if index == 0 {
            self.cumulative_weights[0]
        } else {
            self.cumulative_weights[index] - self.cumulative_weights[index - 1]
        }
    }

    pub fn cdf(&self, x: f64) -> f64 {
        self.components.iter()
            .enumerate()
            .map(|(i, component)| self.weight(i) * component.cdf(x))
            .sum()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let choice: f64 = rng.gen();
        let index = self.cumulative_weights.iter()
            .position(|c| choice < *c)
            .unwrap_or(self.components.len() - 1);
        let p = rng.gen_range(f64::EPSILON, 1.0);
        self.components[index].inverse_cdf(p)
    }

    /// Flat row-major samples filling `shape`.
    pub fn sample_shape<R: Rng + ?Sized>(&self, rng: &mut R, shape: &[usize]) -> Vec<f32> {
        let len = shape.iter().product();
        (0..len).map(|_| self.sample(rng) as f32).collect()
    }

    /// One latent vector per batch entry.
    pub fn sample_batch<R: Rng + ?Sized>(&self, rng: &mut R, batch_size: usize, latent_size: usize) -> Vec<Vec<f32>> {
        self.sample_shape(rng, &[batch_size, latent_size])
            .chunks(latent_size.max(1))
            .map(<[f32]>::to_vec)
            .collect()
    }

}
