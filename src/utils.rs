use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

#[inline(always)]
pub fn square_f32(n: f32) -> f32 {
    n * n
}

const SEED_XOR: u128 = 0b10101010101010101010101010101010101010101010101010101010101010101010101010101010101010101010101010101010101010101010101010101010;

pub fn stable_hash_seed(s: &str) -> [u8; 16] {
    let mut val = 17u128;
    for byte in s.as_bytes() {
        val = 31u128.wrapping_mul(val).wrapping_add(*byte as u128);
        val ^= SEED_XOR;
    }
    val.to_le_bytes()
}

/// Deterministic rng for one named purpose within a seeded run, so that
/// e.g. data shuffling and latent sampling do not share a stream.
pub fn seeded_rng(purpose: &str, seed: u64) -> XorShiftRng {
    XorShiftRng::from_seed(stable_hash_seed(&format!("{}:{}", purpose, seed)))
}

pub fn l2_norm_f32(values: &[f32]) -> f32 {
    values.iter().map(|v| square_f32(*v)).sum::<f32>().sqrt()
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_stable_hash_seed() {
        assert_eq!(stable_hash_seed("foo"), stable_hash_seed("foo"));
        assert_ne!(stable_hash_seed("foo"), stable_hash_seed("bar"));
    }

    #[test]
    fn test_seeded_rng_streams() {
        let mut a = seeded_rng("data", 0);
        let mut b = seeded_rng("data", 0);
        let mut c = seeded_rng("latent", 0);
        let a_vals: Vec<u32> = (0..4).map(|_| a.gen()).collect();
        let b_vals: Vec<u32> = (0..4).map(|_| b.gen()).collect();
        let c_vals: Vec<u32> = (0..4).map(|_| c.gen()).collect();
        assert_eq!(a_vals, b_vals);
        assert_ne!(a_vals, c_vals);
    }

    #[test]
    fn test_norms() {
        assert!((l2_norm_f32(&[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert_eq!(l2_norm_f32(&[]), 0.0);
    }

}
