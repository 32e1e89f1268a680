use rand::SeedableRng;
use rand::Rng;
use rand::distributions::StandardNormal;
use rand_xorshift::XorShiftRng;

use crate::utils::stable_hash_seed;

pub trait NetInitializer {
    fn get_weight(&mut self, layer_index: usize, fan_in: usize) -> f32;
    fn get_bias(&mut self, layer_index: usize) -> f32;
}

/// Normally distributed weights scaled by `1 / sqrt(fan_in)`.
#[derive(Clone)]
pub struct RandomNetInitializer {
    bias_std_dev: f32,
    rng: XorShiftRng
}

impl RandomNetInitializer {

    pub fn new_standard_with_seed(val: &str) -> Self {
        RandomNetInitializer {
            bias_std_dev: 0.01,
            rng: XorShiftRng::from_seed(stable_hash_seed(val))
        }
    }

}

impl NetInitializer for RandomNetInitializer {

    fn get_weight(&mut self, _layer_index: usize, fan_in: usize) -> f32 {
        let std_dev = 1.0 / (fan_in.max(1) as f32).sqrt();
        self.rng.sample(StandardNormal) as f32 * std_dev
    }

    fn get_bias(&mut self, _layer_index: usize) -> f32 {
        self.rng.sample(StandardNormal) as f32 * self.bias_std_dev
    }

}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_seed_is_reproducible() {
        let mut a = RandomNetInitializer::new_standard_with_seed("a random string");
        let mut b = RandomNetInitializer::new_standard_with_seed("a random string");
        for _ in 0..10 {
            assert_eq!(a.get_weight(0, 16), b.get_weight(0, 16));
            assert_eq!(a.get_bias(0), b.get_bias(0));
        }
    }

    #[test]
    fn test_weight_scale_follows_fan_in() {
        let mut init = RandomNetInitializer::new_standard_with_seed("scale");
        let n = 20_000;
        let variance: f32 = (0..n)
            .map(|_| init.get_weight(0, 100))
            .map(|w| w * w)
            .sum::<f32>() / n as f32;
        assert!((variance - 0.01).abs() < 0.001, "variance {}", variance);
    }

}
