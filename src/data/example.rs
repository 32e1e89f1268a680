use serde::{Deserialize, Serialize};

use crate::buffer::{crop_padded_slice, Plane};
use crate::error::{CrowdError, Result};

pub const IMAGE_CHANNELS: usize = 3;

/// A channel-major RGB image with values normalized to `[-1, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Image {
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl Image {

    pub fn from_vec(height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        let expected = IMAGE_CHANNELS * height * width;
        if data.len() != expected {
            return Err(CrowdError::ShapeMismatch("image data", expected, data.len()));
        }
        Ok(Image { height, width, data })
    }

    pub fn zeros(height: usize, width: usize) -> Self {
        Image {
            height,
            width,
            data: vec![0.0; IMAGE_CHANNELS * height * width],
        }
    }

    pub fn from_channels(channels: &[Plane; IMAGE_CHANNELS]) -> Result<Self> {
        let (height, width) = (channels[0].height(), channels[0].width());
        let mut data = Vec::with_capacity(IMAGE_CHANNELS * height * width);
        for channel in channels.iter() {
            if !channel.same_shape(&channels[0]) {
                return Err(CrowdError::ShapeMismatch("image channel", height * width, channel.len()));
            }
            data.extend_from_slice(channel.as_slice());
        }
        Ok(Image { height, width, data })
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        let area = self.height * self.width;
        &self.data[channel * area..(channel + 1) * area]
    }

    /// Copies a window of the image; parts outside the image are zero.
    pub fn crop_padded(&self, top: isize, left: isize, rows: usize, cols: usize) -> Image {
        let area = self.height * self.width;
        let mut data = Vec::with_capacity(IMAGE_CHANNELS * rows * cols);
        for channel in 0..IMAGE_CHANNELS {
            data.extend(crop_padded_slice(
                &self.data[channel * area..(channel + 1) * area],
                self.height,
                self.width,
                top,
                left,
                rows,
                cols,
            ));
        }
        Image { height: rows, width: cols, data }
    }

    /// `self + step * direction`, with `direction` laid out like the image
    /// data.
    pub fn offset_along(&self, direction: &[f32], step: f32) -> Result<Image> {
        if direction.len() != self.data.len() {
            return Err(CrowdError::ShapeMismatch("image offset", self.data.len(), direction.len()));
        }
        Ok(Image {
            height: self.height,
            width: self.width,
            data: self.data.iter().zip(direction.iter()).map(|(v, d)| v + step * d).collect(),
        })
    }

    /// `alpha * self + (1 - alpha) * other`.
    pub fn interpolate(&self, other: &Image, alpha: f32) -> Image {
        debug_assert_eq!(self.data.len(), other.data.len());
        Image {
            height: self.height,
            width: self.width,
            data: self.data.iter()
                .zip(other.data.iter())
                .map(|(a, b)| alpha * a + (1.0 - alpha) * b)
                .collect(),
        }
    }

}

/// A fixed-size image patch with its density label. The count of an
/// example is always the sum of its label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub image: Image,
    pub label: Plane,
}

impl Example {

    pub fn new(image: Image, label: Plane) -> Result<Self> {
        if image.height() != label.height() || image.width() != label.width() {
            return Err(CrowdError::ShapeMismatch(
                "example label",
                image.height() * image.width(),
                label.len(),
            ));
        }
        Ok(Example { image, label })
    }

    #[inline]
    pub fn count(&self) -> f32 {
        self.label.sum()
    }

}

/// A patch cut out of a full scene, centred at (`x`, `y`) in scene
/// coordinates.
#[derive(Clone, Debug)]
pub struct ExampleWithPosition {
    pub example: Example,
    pub x: usize,
    pub y: usize,
}

/// A full-resolution scene and its full-resolution density label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FullSceneExample {
    pub image: Image,
    pub label: Plane,
}

impl FullSceneExample {

    pub fn new(image: Image, label: Plane) -> Result<Self> {
        let example = Example::new(image, label)?;
        Ok(FullSceneExample { image: example.image, label: example.label })
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.label.height()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.label.width()
    }

    pub fn count(&self) -> f32 {
        self.label.sum()
    }

    /// Extracts the `patch_size` square patch centred at (`x`, `y`), zero
    /// padded where it leaves the scene.
    pub fn extract_patch(&self, x: usize, y: usize, patch_size: usize) -> ExampleWithPosition {
        let half = (patch_size / 2) as isize;
        let top = y as isize - half;
        let left = x as isize - half;
        ExampleWithPosition {
            example: Example {
                image: self.image.crop_padded(top, left, patch_size, patch_size),
                label: self.label.crop_padded(top, left, patch_size, patch_size),
            },
            x,
            y,
        }
    }

}

#[derive(Clone, Debug)]
pub struct LabeledBatch {
    pub images: Vec<Image>,
    pub labels: Vec<Plane>,
}

impl LabeledBatch {

    pub fn from_examples(examples: Vec<Example>) -> Self {
        let mut images = Vec::with_capacity(examples.len());
        let mut labels = Vec::with_capacity(examples.len());
        for example in examples {
            images.push(example.image);
            labels.push(example.label);
        }
        LabeledBatch { images, labels }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.images.len()
    }

}
