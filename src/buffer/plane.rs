use serde::{Deserialize, Serialize};

use crate::error::{CrowdError, Result};

/// A row-major 2-D `f32` buffer, used for density maps, image channels and
/// the scene-sized accumulators of sliding-window inference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    height: usize,
    width: usize,
    data: Vec<f32>,
}

/// A rectangle within a plane: `rows` rows starting at `y`, `cols` columns
/// starting at `x`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub y: usize,
    pub x: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Plane {

    pub fn new_filled(height: usize, width: usize, value: f32) -> Self {
        Plane {
            height,
            width,
            data: vec![value; height * width],
        }
    }

    pub fn zeros(height: usize, width: usize) -> Self {
        Self::new_filled(height, width, 0.0)
    }

    pub fn from_vec(height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != height * width {
            return Err(CrowdError::ShapeMismatch("plane data", height * width, data.len()));
        }
        Ok(Plane { height, width, data })
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
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn same_shape(&self, other: &Plane) -> bool {
        self.height == other.height && self.width == other.width
    }

    #[inline]
    pub fn get(&self, y: usize, x: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, y: usize, x: usize, value: f32) {
        self.data[y * self.width + x] = value;
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    pub fn max(&self) -> f32 {
        self.data.iter().cloned().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Adds `source` restricted to `source_region` into this plane at
    /// (`y`, `x`).
    pub fn add_region_from(&mut self, y: usize, x: usize, source: &Plane, source_region: Region) {
        debug_assert!(y + source_region.rows <= self.height);
        debug_assert!(x + source_region.cols <= self.width);
        for row in 0..source_region.rows {
            let src_start = (source_region.y + row) * source.width + source_region.x;
            let dst_start = (y + row) * self.width + x;
            let src = &source.data[src_start..src_start + source_region.cols];
            let dst = &mut self.data[dst_start..dst_start + source_region.cols];
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d += *s;
            }
        }
    }

    /// Adds `value` to every element inside `region`.
    pub fn add_scalar_to_region(&mut self, region: Region, value: f32) {
        for row in region.y..region.y + region.rows {
            let start = row * self.width + region.x;
            for element in &mut self.data[start..start + region.cols] {
                *element += value;
            }
        }
    }

    /// Copies the `rows` x `cols` window whose top-left corner is at
    /// (`top`, `left`). Parts of the window outside the plane are zero.
    pub fn crop_padded(&self, top: isize, left: isize, rows: usize, cols: usize) -> Plane {
        Plane {
            height: rows,
            width: cols,
            data: crop_padded_slice(&self.data, self.height, self.width, top, left, rows, cols),
        }
    }

    pub fn map_inplace(&mut self, f: impl Fn(f32) -> f32) {
        for element in self.data.iter_mut() {
            *element = f(*element);
        }
    }

    /// Elementwise `self / other`.
    pub fn divide_by(&mut self, other: &Plane) {
        assert!(self.same_shape(other));
        for (element, divisor) in self.data.iter_mut().zip(other.data.iter()) {
            *element /= *divisor;
        }
    }

    /// Sum of `f(self - other)` over all elements; errors if shapes differ.
    pub fn diff_sum(&self, other: &Plane, f: impl Fn(f32) -> f32) -> Result<f32> {
        if !self.same_shape(other) {
            return Err(CrowdError::ShapeMismatch("plane", self.len(), other.len()));
        }
        Ok(self.data.iter()
            .zip(other.data.iter())
            .map(|(a, b)| f(a - b))
            .sum())
    }

    pub fn abs_diff_sum(&self, other: &Plane) -> Result<f32> {
        self.diff_sum(other, f32::abs)
    }

    pub fn squared_diff_sum(&self, other: &Plane) -> Result<f32> {
        self.diff_sum(other, |d| d * d)
    }

}

/// Window copy over a raw row-major `height` x `width` slice, zero padded.
pub fn crop_padded_slice(
    data: &[f32],
    height: usize,
    width: usize,
    top: isize,
    left: isize,
    rows: usize,
    cols: usize,
) -> Vec<f32> {
    debug_assert_eq!(data.len(), height * width);
    let mut out = vec![0f32; rows * cols];
    for row in 0..rows {
        let y = top + row as isize;
        if y < 0 || y >= height as isize {
            continue;
        }
        for col in 0..cols {
            let x = left + col as isize;
            if x < 0 || x >= width as isize {
                continue;
            }
            out[row * cols + col] = data[y as usize * width + x as usize];
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_vec_checks_shape() {
        assert!(Plane::from_vec(2, 2, vec![1.0; 4]).is_ok());
        match Plane::from_vec(2, 3, vec![1.0; 4]) {
            Err(CrowdError::ShapeMismatch(_, 6, 4)) => {},
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_add_region_from() {
        let mut target = Plane::zeros(3, 4);
        let source = Plane::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        target.add_region_from(1, 2, &source, Region { y: 0, x: 1, rows: 2, cols: 1 });
        assert_eq!(target.as_slice(), &[
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 2.0, 0.0,
            0.0, 0.0, 4.0, 0.0,
        ]);
        target.add_scalar_to_region(Region { y: 0, x: 0, rows: 1, cols: 2 }, 0.5);
        assert_eq!(target.sum(), 7.0);
    }

    #[test]
    fn test_crop_padded() {
        let plane = Plane::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let crop = plane.crop_padded(-1, 0, 2, 3);
        assert_eq!(crop.as_slice(), &[0.0, 0.0, 0.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_diff_sums() {
        let a = Plane::from_vec(1, 3, vec![1.0, -1.0, 2.0]).unwrap();
        let b = Plane::zeros(1, 3);
        assert_eq!(a.abs_diff_sum(&b).unwrap(), 4.0);
        assert_eq!(a.squared_diff_sum(&b).unwrap(), 6.0);
        assert!(a.abs_diff_sum(&Plane::zeros(3, 1)).is_err());
    }

}
