use rand::Rng;
use rand_xorshift::XorShiftRng;

use crate::buffer::Plane;
use crate::data::{Example, FullSceneExample, Image};
use crate::error::Result;
use crate::utils::seeded_rng;

/// Generator of synthetic crowd scenes: people are Gaussian blobs in the
/// image and unit-mass Gaussian kernels in the density label.
pub struct SyntheticCrowd {
    scene_size: usize,
    patch_size: usize,
    max_people: usize,
    person_sigma: f32,
    rng: XorShiftRng,
}

impl SyntheticCrowd {

    pub fn new(scene_size: usize, patch_size: usize, seed: u64) -> Self {
        SyntheticCrowd::for_stream(scene_size, patch_size, "synthetic crowd", seed)
    }

    /// Independent generator per named stream, e.g. `"validation"`.
    pub fn for_stream(scene_size: usize, patch_size: usize, stream: &str, seed: u64) -> Self {
        assert!(scene_size >= patch_size && patch_size > 0);
        SyntheticCrowd {
            scene_size,
            patch_size,
            max_people: (scene_size * scene_size / 16).max(1),
            person_sigma: 1.0,
            rng: seeded_rng(stream, seed),
        }
    }

    pub fn generate_scene(&mut self) -> Result<FullSceneExample> {
        let size = self.scene_size;
        let people = self.rng.gen_range(0, self.max_people + 1);
        let mut label = Plane::zeros(size, size);
        let mut intensity = Plane::zeros(size, size);
        for _ in 0..people {
            let cy = self.rng.gen_range(0.0, size as f32);
            let cx = self.rng.gen_range(0.0, size as f32);
            let kernel = gaussian_kernel(size, size, cy, cx, self.person_sigma);
            let mass = kernel.sum();
            if mass <= 0.0 {
                continue;
            }
            for (l, (i, k)) in label.as_mut_slice().iter_mut()
                .zip(intensity.as_mut_slice().iter_mut().zip(kernel.as_slice().iter())) {
                *l += k / mass;
                *i += k;
            }
        }
        let tints = [0.9f32, 0.6, 0.3];
        let mut channels = [Plane::zeros(size, size), Plane::zeros(size, size), Plane::zeros(size, size)];
        for (channel, tint) in channels.iter_mut().zip(tints.iter()) {
            for (value, i) in channel.as_mut_slice().iter_mut().zip(intensity.as_slice().iter()) {
                let noise = self.rng.gen_range(-0.05, 0.05);
                *value = (-0.5 + tint * i + noise).max(-1.0).min(1.0);
            }
        }
        FullSceneExample::new(Image::from_channels(&channels)?, label)
    }

    /// A randomly positioned patch fully inside the scene.
    pub fn random_patch(&mut self, scene: &FullSceneExample) -> Example {
        let half = self.patch_size / 2;
        let y = self.rng.gen_range(half, scene.height() - (self.patch_size - half) + 1);
        let x = self.rng.gen_range(half, scene.width() - (self.patch_size - half) + 1);
        scene.extract_patch(x, y, self.patch_size).example
    }

    pub fn patches(&mut self, count: usize) -> Result<Vec<Example>> {
        let mut patches = Vec::with_capacity(count);
        while patches.len() < count {
            let scene = self.generate_scene()?;
            for _ in 0..4.min(count - patches.len()) {
                patches.push(self.random_patch(&scene));
            }
        }
        Ok(patches)
    }

    pub fn scenes(&mut self, count: usize) -> Result<Vec<FullSceneExample>> {
        (0..count).map(|_| self.generate_scene()).collect()
    }

}

fn gaussian_kernel(height: usize, width: usize, cy: f32, cx: f32, sigma: f32) -> Plane {
    let mut kernel = Plane::zeros(height, width);
    let radius = (3.0 * sigma).ceil() as isize;
    let (py, px) = (cy.floor() as isize, cx.floor() as isize);
    for y in (py - radius).max(0)..(py + radius + 1).min(height as isize) {
        for x in (px - radius).max(0)..(px + radius + 1).min(width as isize) {
            let dy = y as f32 + 0.5 - cy;
            let dx = x as f32 + 0.5 - cx;
            kernel.set(y as usize, x as usize, (-(dy * dy + dx * dx) / (2.0 * sigma * sigma)).exp());
        }
    }
    kernel
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_scene_count_is_whole_people() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut crowd = SyntheticCrowd::new(16, 8, 1);
        for scene in crowd.scenes(5)? {
            let count = scene.count();
            assert!((count - count.round()).abs() < 1e-3, "count {}", count);
            assert!(scene.image.as_slice().iter().all(|v| *v >= -1.0 && *v <= 1.0));
        }
        Ok(())
    }

    #[test]
    fn test_patches_have_patch_shape() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut crowd = SyntheticCrowd::new(16, 8, 2);
        let patches = crowd.patches(6)?;
        assert_eq!(patches.len(), 6);
        for patch in patches {
            assert_eq!((patch.label.height(), patch.label.width()), (8, 8));
            assert_eq!((patch.image.height(), patch.image.width()), (8, 8));
        }
        Ok(())
    }

}
