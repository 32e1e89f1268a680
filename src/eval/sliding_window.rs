use itertools::Itertools;
use tracing::{debug, info};

use crate::buffer::{Plane, Region};
use crate::data::{ExampleWithPosition, FullSceneExample, Image};
use crate::error::{CrowdError, Result};
use crate::model::{DensityEstimator, Prediction};

/// Patch centres of a sliding-window scan, row by row. The first centre is
/// `(half, half)`; `x` then advances by the step and wraps back to `half`
/// once it reaches the width, advancing `y`.
#[derive(Clone, Debug)]
pub struct PatchPositions {
    height: usize,
    width: usize,
    half: usize,
    step: usize,
    next: Option<(usize, usize)>,
}

impl PatchPositions {

    pub fn new(height: usize, width: usize, patch_size: usize, step: usize) -> Self {
        assert!(step > 0);
        let half = patch_size / 2;
        let next = if half < height && half < width { Some((half, half)) } else { None };
        PatchPositions { height, width, half, step, next }
    }

}

impl Iterator for PatchPositions {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<(usize, usize)> {
        let current = self.next?;
        let (mut x, mut y) = (current.0 + self.step, current.1);
        if x >= self.width {
            x = self.half;
            y += self.step;
        }
        self.next = if y < self.height { Some((x, y)) } else { None };
        Some(current)
    }
}

/// Where a patch centred at `centre` lands on an axis of length `extent`:
/// the first scene index, the first patch index and the overlap length.
fn clip_axis(centre: usize, half: usize, patch_size: usize, extent: usize) -> (usize, usize, usize) {
    let top = centre as isize - half as isize;
    let start = top.max(0) as usize;
    let end = ((top + patch_size as isize).max(0) as usize).min(extent);
    let start_offset = (start as isize - top) as usize;
    (start, start_offset, end.saturating_sub(start))
}

/// Scene-sized sums of patch densities, spread counts and hit counts for
/// one scene's inference pass.
pub struct AggregationBuffers {
    patch_size: usize,
    density_sum: Plane,
    count_sum: Plane,
    hits: Plane,
}

/// Aggregated prediction for a full scene.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenePrediction {
    pub density: Plane,
    pub count: f32,
    pub hits: Plane,
}

impl AggregationBuffers {

    pub fn new(height: usize, width: usize, patch_size: usize) -> Self {
        AggregationBuffers {
            patch_size,
            density_sum: Plane::zeros(height, width),
            count_sum: Plane::zeros(height, width),
            hits: Plane::zeros(height, width),
        }
    }

    /// Adds the part of a prediction centred at (`x`, `y`) that lies inside
    /// the scene.
    pub fn add(&mut self, x: usize, y: usize, prediction: &Prediction) -> Result<()> {
        let patch_size = self.patch_size;
        if prediction.density.height() != patch_size || prediction.density.width() != patch_size {
            return Err(CrowdError::ShapeMismatch("patch density", patch_size * patch_size, prediction.density.len()));
        }
        let half = patch_size / 2;
        let (scene_y, patch_y, rows) = clip_axis(y, half, patch_size, self.hits.height());
        let (scene_x, patch_x, cols) = clip_axis(x, half, patch_size, self.hits.width());
        let scene_region = Region { y: scene_y, x: scene_x, rows, cols };

        self.density_sum.add_region_from(scene_y, scene_x, &prediction.density, Region { y: patch_y, x: patch_x, rows, cols });
        self.count_sum.add_scalar_to_region(scene_region, prediction.count / (patch_size * patch_size) as f32);
        self.hits.add_scalar_to_region(scene_region, 1.0);
        Ok(())
    }

    /// Averages by hit count; pixels no patch touched count as one hit.
    pub fn finish(self) -> ScenePrediction {
        let AggregationBuffers { mut density_sum, mut count_sum, mut hits, .. } = self;
        hits.map_inplace(|h| if h == 0.0 { 1.0 } else { h });
        density_sum.divide_by(&hits);
        count_sum.divide_by(&hits);
        ScenePrediction {
            density: density_sum,
            count: count_sum.sum(),
            hits,
        }
    }

}

/// Errors of one scene's aggregated prediction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneErrors {
    pub true_count: f32,
    pub count_error: f32,
    pub density_error: f32,
}

impl SceneErrors {

    pub fn between(prediction: &ScenePrediction, scene: &FullSceneExample) -> Result<Self> {
        let true_count = scene.count();
        Ok(SceneErrors {
            true_count,
            count_error: (prediction.count - true_count).abs(),
            density_error: prediction.density.abs_diff_sum(&scene.label)?,
        })
    }

}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SlidingWindowTotals {
    pub scenes: usize,
    pub total_count: f32,
    pub total_count_error: f32,
    pub total_density_error: f32,
}

impl SlidingWindowTotals {

    pub fn add(&mut self, errors: &SceneErrors) {
        self.scenes += 1;
        self.total_count += errors.true_count;
        self.total_count_error += errors.count_error;
        self.total_density_error += errors.density_error;
    }

}

/// Sliding-window inference of fixed-size-patch networks over full scenes.
#[derive(Clone, Copy, Debug)]
pub struct PatchAggregator {
    pub patch_size: usize,
    pub step: usize,
    pub batch_size: usize,
}

impl PatchAggregator {

    pub fn new(patch_size: usize, step: usize, batch_size: usize) -> Self {
        assert!(patch_size > 0 && step > 0 && batch_size > 0);
        PatchAggregator { patch_size, step, batch_size }
    }

    pub fn positions(&self, height: usize, width: usize) -> PatchPositions {
        PatchPositions::new(height, width, self.patch_size, self.step)
    }

    pub fn predict_scene(&self, network: &dyn DensityEstimator, scene: &FullSceneExample) -> Result<ScenePrediction> {
        if network.patch_size() != self.patch_size {
            return Err(CrowdError::ShapeMismatch("network patch size", self.patch_size, network.patch_size()));
        }
        let mut buffers = AggregationBuffers::new(scene.height(), scene.width(), self.patch_size);
        for batch in &self.positions(scene.height(), scene.width()).chunks(self.batch_size) {
            let patches: Vec<ExampleWithPosition> = batch
                .map(|(x, y)| scene.extract_patch(x, y, self.patch_size))
                .collect();
            let images: Vec<Image> = patches.iter().map(|patch| patch.example.image.clone()).collect();
            let predictions = network.predict_batch(&images)?;
            for (patch, prediction) in patches.iter().zip(predictions.iter()) {
                buffers.add(patch.x, patch.y, prediction)?;
            }
        }
        Ok(buffers.finish())
    }

    /// Runs every scene and logs the accumulated totals.
    pub fn evaluate(&self, network: &dyn DensityEstimator, scenes: &[FullSceneExample]) -> Result<SlidingWindowTotals> {
        let mut totals = SlidingWindowTotals::default();
        for (index, scene) in scenes.iter().enumerate() {
            let errors = SceneErrors::between(&self.predict_scene(network, scene)?, scene)?;
            debug!(scene = index, count_error = errors.count_error, density_error = errors.density_error, "scene evaluated");
            totals.add(&errors);
        }
        info!("Total count: {}.", totals.total_count);
        info!("Total count error: {}.", totals.total_count_error);
        info!("Total density error: {}.", totals.total_density_error);
        Ok(totals)
    }

}
