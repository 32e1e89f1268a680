use crate::buffer::Plane;
use crate::data::Example;
use crate::error::{CrowdError, Result};
use crate::model::{DensityEstimator, Prediction};
use crate::train::SummaryRecorder;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EvaluationSummary {
    pub items: usize,
    pub count_mae: f32,
    pub count_mse: f32,
    pub density_mae: f32,
    pub density_mse: f32,
}

/// Per-item errors of fixed-size patch predictions across a dataset. The
/// first batch fixes the density shape.
#[derive(Clone, Debug, Default)]
pub struct EvaluationAccumulator {
    shape: Option<(usize, usize)>,
    count_errors: Vec<f32>,
    density_abs_errors: Vec<f32>,
    density_squared_errors: Vec<f32>,
}

impl EvaluationAccumulator {

    pub fn new() -> Self {
        EvaluationAccumulator::default()
    }

    pub fn add_batch(&mut self, predictions: &[Prediction], labels: &[Plane]) -> Result<()> {
        if predictions.len() != labels.len() {
            return Err(CrowdError::ShapeMismatch("evaluation batch", labels.len(), predictions.len()));
        }
        for (prediction, label) in predictions.iter().zip(labels.iter()) {
            let item_shape = (prediction.density.height(), prediction.density.width());
            let (height, width) = *self.shape.get_or_insert(item_shape);
            if item_shape != (height, width) {
                return Err(CrowdError::ShapeMismatch("evaluated density", height * width, prediction.density.len()));
            }
            self.count_errors.push(prediction.count - label.sum());
            self.density_abs_errors.push(prediction.density.abs_diff_sum(label)?);
            self.density_squared_errors.push(prediction.density.squared_diff_sum(label)?);
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count_errors.len()
    }

    pub fn summarize(&self) -> Result<EvaluationSummary> {
        if self.count_errors.is_empty() {
            return Err(CrowdError::EmptyDataset);
        }
        let n = self.len() as f32;
        let mean = |values: &[f32]| values.iter().sum::<f32>() / n;
        Ok(EvaluationSummary {
            items: self.len(),
            count_mae: self.count_errors.iter().map(|e| e.abs()).sum::<f32>() / n,
            count_mse: self.count_errors.iter().map(|e| e * e).sum::<f32>() / n,
            density_mae: mean(&self.density_abs_errors),
            density_mse: mean(&self.density_squared_errors),
        })
    }

}

/// Evaluates `network` over `examples` in batches, records the errors under
/// `summary_name` and returns the count MAE. With a `comparison_value` the
/// ratio of this count MAE to it is recorded as well.
pub fn evaluation_epoch(
    network: &dyn DensityEstimator,
    examples: &[Example],
    batch_size: usize,
    summary: &mut dyn SummaryRecorder,
    summary_name: &str,
    step: usize,
    comparison_value: Option<f32>,
) -> Result<f32> {
    let mut accumulator = EvaluationAccumulator::new();
    for batch in examples.chunks(batch_size.max(1)) {
        let images: Vec<_> = batch.iter().map(|example| example.image.clone()).collect();
        let labels: Vec<_> = batch.iter().map(|example| example.label.clone()).collect();
        accumulator.add_batch(&network.predict_batch(&images)?, &labels)?;
    }
    let result = accumulator.summarize()?;
    summary.record_scalar(&format!("{}/MAE", summary_name), result.count_mae, step)?;
    summary.record_scalar(&format!("{}/Density MAE", summary_name), result.density_mae, step)?;
    summary.record_scalar(&format!("{}/MSE", summary_name), result.count_mse, step)?;
    summary.record_scalar(&format!("{}/Density MSE", summary_name), result.density_mse, step)?;
    if let Some(comparison_value) = comparison_value {
        summary.record_scalar(&format!("{}/Ratio MAE GAN DNN", summary_name), result.count_mae / comparison_value, step)?;
    }
    Ok(result.count_mae)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::data::Image;
    use crate::train::MemorySummaryWriter;

    /// Looks each image up among known examples and answers with its label,
    /// plus a fixed count offset.
    struct LookupNet {
        examples: Vec<Example>,
        count_offset: f32,
    }

    impl DensityEstimator for LookupNet {

        fn patch_size(&self) -> usize {
            2
        }

        fn predict_batch(&self, images: &[Image]) -> Result<Vec<Prediction>> {
            Ok(images.iter()
                .map(|image| {
                    let label = self.examples.iter()
                        .find(|example| &example.image == image)
                        .map(|example| example.label.clone())
                        .unwrap_or_else(|| Plane::zeros(2, 2));
                    let count = label.sum() + self.count_offset;
                    Prediction { density: label, count }
                })
                .collect())
        }

    }

    fn examples() -> Vec<Example> {
        (0..5)
            .map(|i| {
                let image = Image::from_vec(2, 2, vec![i as f32; 12]).unwrap();
                Example::new(image, Plane::new_filled(2, 2, i as f32 * 0.25)).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_perfect_network_has_zero_errors() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let examples = examples();
        let net = LookupNet { examples: examples.clone(), count_offset: 0.0 };
        let mut summary = MemorySummaryWriter::new(1, 1);
        let mae = evaluation_epoch(&net, &examples, 2, &mut summary, "1 Validation Error", 0, None)?;
        assert_eq!(mae, 0.0);
        for name in &["MAE", "Density MAE", "MSE", "Density MSE"] {
            assert_eq!(summary.scalar_series(&format!("1 Validation Error/{}", name)), vec![(0, 0.0)]);
        }
        Ok(())
    }

    #[test]
    fn test_count_offset_and_ratio() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let examples = examples();
        let net = LookupNet { examples: examples.clone(), count_offset: -2.0 };
        let mut summary = MemorySummaryWriter::new(1, 1);
        let mae = evaluation_epoch(&net, &examples, 3, &mut summary, "GAN", 4, Some(4.0))?;
        assert_eq!(mae, 2.0);
        assert_eq!(summary.scalar_series("GAN/MSE"), vec![(4, 4.0)]);
        assert_eq!(summary.scalar_series("GAN/Ratio MAE GAN DNN"), vec![(4, 0.5)]);
        Ok(())
    }

    #[test]
    fn test_shape_change_and_empty_are_errors() {
        let mut accumulator = EvaluationAccumulator::new();
        assert!(accumulator.summarize().is_err());
        let small = Prediction { density: Plane::zeros(2, 2), count: 0.0 };
        let large = Prediction { density: Plane::zeros(3, 3), count: 0.0 };
        assert!(accumulator.add_batch(&[small], &[Plane::zeros(2, 2)]).is_ok());
        assert!(accumulator.add_batch(&[large], &[Plane::zeros(3, 3)]).is_err());
        assert!(accumulator.add_batch(&[], &[Plane::zeros(2, 2)]).is_err());
    }

}
