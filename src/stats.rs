use std::{f32, fmt};

/// Running summary of a scalar series, e.g. a loss between two summary
/// steps.
#[derive(Clone, Default)]
pub struct Stats {
    sum: f32,
    count: u32,
    max: Option<f32>,
    min: Option<f32>,
    last: Option<f32>,
}

impl fmt::Debug for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), std::fmt::Error> {
        f.debug_struct("Stats")
            .field("count", &self.count)
            .field("min", &self.min())
            .field("max", &self.max())
            .field("last", &self.last())
            .field("mean", &self.mean())
            .finish()
    }
}

impl Stats {

    pub fn new() -> Self {
        Stats::default()
    }

    #[inline]
    pub fn report(&mut self, value: f32) {
        self.sum += value;
        self.count += 1;
        self.last = Some(value);
        self.min = Some(self.min.map_or(value, |min| min.min(value)));
        self.max = Some(self.max.map_or(value, |max| max.max(value)));
    }

    /// NaN while nothing has been reported.
    #[inline]
    pub fn mean(&self) -> f32 {
        if self.count == 0 {
            return f32::NAN;
        }
        self.sum / self.count as f32
    }

    #[inline]
    pub fn max(&self) -> f32 {
        self.max.unwrap_or(f32::NAN)
    }

    #[inline]
    pub fn min(&self) -> f32 {
        self.min.unwrap_or(f32::NAN)
    }

    #[inline]
    pub fn last(&self) -> f32 {
        self.last.unwrap_or(f32::NAN)
    }

    #[inline]
    pub fn sum(&self) -> f32 {
        self.sum
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        *self = Stats::default();
    }

}
