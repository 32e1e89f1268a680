use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::buffer::Plane;
use crate::data::{Image, IMAGE_CHANNELS};
use crate::error::{CrowdError, Result};

/// Sink for named training summaries keyed by step. Scalars are kept only
/// on summary steps and images only on presentation steps.
pub trait SummaryRecorder {
    fn summary_period(&self) -> usize;
    fn presentation_period(&self) -> usize;
    fn write_scalar(&mut self, name: &str, value: f32, step: usize) -> Result<()>;
    fn write_image(&mut self, name: &str, image: &Image, step: usize) -> Result<()>;

    fn is_summary_step(&self, step: usize) -> bool {
        step % self.summary_period() == 0
    }

    fn is_presentation_step(&self, step: usize) -> bool {
        step % self.presentation_period() == 0
    }

    fn record_scalar(&mut self, name: &str, value: f32, step: usize) -> Result<()> {
        if self.is_summary_step(step) {
            self.write_scalar(name, value, step)?;
        }
        Ok(())
    }

    fn record_image(&mut self, name: &str, image: &Image, step: usize) -> Result<()> {
        if self.is_presentation_step(step) {
            self.write_image(name, image, step)?;
        }
        Ok(())
    }
}

/// Writes scalars as `step,name,value` rows of `scalars.csv` and images as
/// binary PPM files, all inside one directory.
pub struct CsvSummaryWriter {
    directory: PathBuf,
    scalars: csv::Writer<File>,
    summary_period: usize,
    presentation_period: usize,
}

impl CsvSummaryWriter {

    pub fn create(directory: impl AsRef<Path>, summary_period: usize, presentation_period: usize) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        let mut scalars = csv::Writer::from_path(directory.join("scalars.csv"))?;
        scalars.write_record(&["step", "name", "value"])?;
        scalars.flush()?;
        Ok(CsvSummaryWriter {
            directory,
            scalars,
            summary_period: summary_period.max(1),
            presentation_period: presentation_period.max(1),
        })
    }

}

impl SummaryRecorder for CsvSummaryWriter {

    fn summary_period(&self) -> usize {
        self.summary_period
    }

    fn presentation_period(&self) -> usize {
        self.presentation_period
    }

    fn write_scalar(&mut self, name: &str, value: f32, step: usize) -> Result<()> {
        self.scalars.write_record(&[step.to_string(), name.to_string(), value.to_string()])?;
        self.scalars.flush()?;
        Ok(())
    }

    fn write_image(&mut self, name: &str, image: &Image, step: usize) -> Result<()> {
        let file_name = format!("{}_{}.ppm", name.replace(|c: char| !c.is_alphanumeric(), "_"), step);
        let path = self.directory.join(file_name);
        write_ppm(&path, image)?;
        debug!(path = %path.display(), "wrote summary image");
        Ok(())
    }

}

/// Binary PPM (P6) of an image whose values are in `[-1, 1]`.
pub fn write_ppm(path: &Path, image: &Image) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "P6\n{} {}\n255\n", image.width(), image.height())?;
    let area = image.height() * image.width();
    let mut bytes = Vec::with_capacity(IMAGE_CHANNELS * area);
    for pixel in 0..area {
        for channel in 0..IMAGE_CHANNELS {
            let value = image.channel(channel)[pixel];
            bytes.push((((value + 1.0) / 2.0).max(0.0).min(1.0) * 255.0).round() as u8);
        }
    }
    out.write_all(&bytes)?;
    out.flush()?;
    Ok(())
}

/// Grayscale rendering of a density map, scaled so that `max` is white.
pub fn density_to_image(density: &Plane, max: f32) -> Result<Image> {
    let mut gray = density.clone();
    let scale = if max > 0.0 { 2.0 / max } else { 0.0 };
    gray.map_inplace(|v| (v * scale - 1.0).max(-1.0).min(1.0));
    Image::from_channels(&[gray.clone(), gray.clone(), gray])
}

/// Lays equally sized images out row by row, `columns` per row.
pub fn image_grid(images: &[Image], columns: usize) -> Result<Image> {
    let first = images.first().ok_or(CrowdError::EmptyDataset)?;
    let (height, width) = (first.height(), first.width());
    let columns = columns.max(1).min(images.len());
    let rows = (images.len() + columns - 1) / columns;
    let (grid_height, grid_width) = (rows * height, columns * width);
    let mut data = vec![-1.0; IMAGE_CHANNELS * grid_height * grid_width];
    for (index, image) in images.iter().enumerate() {
        if image.height() != height || image.width() != width {
            return Err(CrowdError::ShapeMismatch("grid image", height * width, image.height() * image.width()));
        }
        let (top, left) = ((index / columns) * height, (index % columns) * width);
        for channel in 0..IMAGE_CHANNELS {
            let source = image.channel(channel);
            for y in 0..height {
                let target = channel * grid_height * grid_width + (top + y) * grid_width + left;
                data[target..target + width].copy_from_slice(&source[y * width..(y + 1) * width]);
            }
        }
    }
    Image::from_vec(grid_height, grid_width, data)
}

/// Keeps every record in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySummaryWriter {
    pub scalars: Vec<(String, f32, usize)>,
    pub images: Vec<(String, usize)>,
    summary_period: usize,
    presentation_period: usize,
}

#[cfg(test)]
impl MemorySummaryWriter {

    pub fn new(summary_period: usize, presentation_period: usize) -> Self {
        MemorySummaryWriter {
            scalars: Vec::new(),
            images: Vec::new(),
            summary_period: summary_period.max(1),
            presentation_period: presentation_period.max(1),
        }
    }

    /// `(step, value)` pairs recorded under `name`, in recording order.
    pub fn scalar_series(&self, name: &str) -> Vec<(usize, f32)> {
        self.scalars.iter()
            .filter(|(n, _, _)| n == name)
            .map(|(_, value, step)| (*step, *value))
            .collect()
    }

    pub fn has_image(&self, name: &str) -> bool {
        self.images.iter().any(|(n, _)| n == name)
    }

}

#[cfg(test)]
impl SummaryRecorder for MemorySummaryWriter {

    fn summary_period(&self) -> usize {
        self.summary_period
    }

    fn presentation_period(&self) -> usize {
        self.presentation_period
    }

    fn write_scalar(&mut self, name: &str, value: f32, step: usize) -> Result<()> {
        self.scalars.push((name.to_string(), value, step));
        Ok(())
    }

    fn write_image(&mut self, name: &str, _image: &Image, step: usize) -> Result<()> {
        self.images.push((name.to_string(), step));
        Ok(())
    }

}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_periods_filter_records() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut writer = MemorySummaryWriter::new(2, 3);
        for step in 0..6 {
            writer.record_scalar("Loss/Labeled", step as f32, step)?;
            writer.record_image("Real", &Image::zeros(1, 1), step)?;
        }
        assert_eq!(writer.scalar_series("Loss/Labeled"), vec![(0, 0.0), (2, 2.0), (4, 4.0)]);
        assert_eq!(writer.images, vec![("Real".to_string(), 0), ("Real".to_string(), 3)]);
        assert!(writer.has_image("Real") && !writer.has_image("Fake/Offset"));
        Ok(())
    }

    #[test]
    fn test_csv_writer_files() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let directory = std::env::temp_dir().join("crowd_srgan_summary_test");
        let _ = fs::remove_dir_all(&directory);
        {
            let mut writer = CsvSummaryWriter::create(&directory, 1, 1)?;
            writer.record_scalar("Loss/Labeled", 1.5, 7)?;
            writer.record_image("Fake/Offset", &Image::zeros(2, 3), 7)?;
        }
        let scalars = fs::read_to_string(directory.join("scalars.csv"))?;
        assert_eq!(scalars, "step,name,value\n7,Loss/Labeled,1.5\n");
        let ppm = fs::read(directory.join("Fake_Offset_7.ppm"))?;
        assert!(ppm.starts_with(b"P6\n3 2\n255\n"));
        assert_eq!(ppm.len(), "P6\n3 2\n255\n".len() + 18);
        fs::remove_dir_all(&directory)?;
        Ok(())
    }

    #[test]
    fn test_image_grid_layout() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let white = Image::from_vec(1, 1, vec![1.0; 3])?;
        let grid = image_grid(&[white.clone(), Image::zeros(1, 1), white], 2)?;
        assert_eq!((grid.height(), grid.width()), (2, 2));
        assert_eq!(grid.channel(0), &[1.0, 0.0, 1.0, -1.0]);
        Ok(())
    }

}
