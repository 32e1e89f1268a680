use crate::buffer::{Plane, RowBuffer};
use crate::error::{CrowdError, Result};
use crate::func::{FeatureDistance, FeatureDistanceResult};
use crate::model::Prediction;
use crate::train::Settings;
use crate::utils::l2_norm_f32;

/// Weight of the per-pixel density term relative to the count term.
pub const DENSITY_LOSS_WEIGHT: f32 = 10.0;

/// Labeled regression loss with gradients on each prediction's density
/// values and count.
#[derive(Clone, Debug)]
pub struct LabeledLoss {
    pub loss: f32,
    pub density_grads: Vec<Vec<f32>>,
    pub count_grads: Vec<f32>,
}

/// `mean_i [(cᵢ − Σ tᵢ)² + 10 · Σ_pixels (pᵢ − tᵢ)²]`.
pub fn labeled_loss(predictions: &[Prediction], labels: &[Plane]) -> Result<LabeledLoss> {
    if predictions.len() != labels.len() {
        return Err(CrowdError::ShapeMismatch("labeled batch", labels.len(), predictions.len()));
    }
    if predictions.is_empty() {
        return Err(CrowdError::EmptyDataset);
    }
    let scale = 1.0 / predictions.len() as f32;
    let mut loss = 0.0;
    let mut density_grads = Vec::with_capacity(predictions.len());
    let mut count_grads = Vec::with_capacity(predictions.len());
    for (prediction, label) in predictions.iter().zip(labels.iter()) {
        if !prediction.density.same_shape(label) {
            return Err(CrowdError::ShapeMismatch("predicted density", label.len(), prediction.density.len()));
        }
        let count_error = prediction.count - label.sum();
        loss += count_error * count_error + DENSITY_LOSS_WEIGHT * prediction.density.squared_diff_sum(label)?;
        count_grads.push(2.0 * count_error * scale);
        density_grads.push(
            prediction.density.as_slice().iter()
                .zip(label.as_slice().iter())
                .map(|(p, t)| 2.0 * DENSITY_LOSS_WEIGHT * (p - t) * scale)
                .collect(),
        );
    }
    Ok(LabeledLoss {
        loss: loss * scale,
        density_grads,
        count_grads,
    })
}

/// Contribution of one interpolated example to the gradient penalty. The
/// parameter gradient of the penalty is `coefficient` times the directional
/// derivative of `∇θ s` along `direction`.
#[derive(Clone, Debug)]
pub struct PenaltyTerm {
    pub loss: f32,
    pub coefficient: f32,
    pub direction: Vec<f32>,
}

/// Composes the discriminator and generator losses from one run's
/// multipliers and orders.
#[derive(Clone, Debug)]
pub struct LossComposer {
    pub unlabeled_loss_multiplier: f32,
    pub fake_loss_multiplier: f32,
    pub gradient_penalty_multiplier: f32,
    pub norm_loss_multiplier: f32,
    pub unlabeled_distance: FeatureDistance,
    pub fake_distance: FeatureDistance,
    pub generator_distance: FeatureDistance,
}

fn scaled(mut result: FeatureDistanceResult, multiplier: f32) -> FeatureDistanceResult {
    result.distance *= multiplier;
    for grads in result.gradients_a.iter_mut().chain(result.gradients_b.iter_mut()) {
        for g in grads.iter_mut() {
            *g *= multiplier;
        }
    }
    result
}

impl LossComposer {

    pub fn from_settings(settings: &Settings) -> Self {
        LossComposer {
            unlabeled_loss_multiplier: settings.unlabeled_loss_multiplier,
            fake_loss_multiplier: settings.fake_loss_multiplier,
            gradient_penalty_multiplier: settings.gradient_penalty_multiplier,
            norm_loss_multiplier: settings.norm_loss_multiplier,
            unlabeled_distance: FeatureDistance::with_order(settings.unlabeled_loss_order),
            fake_distance: FeatureDistance::with_order(settings.fake_loss_order),
            generator_distance: FeatureDistance::with_order(settings.generator_loss_order),
        }
    }

    /// Pulls the unlabeled feature mean towards the labeled one. Side `a`
    /// is unlabeled, side `b` labeled.
    pub fn unlabeled_loss(&self, unlabeled: &[&[f32]], labeled: &[&[f32]]) -> FeatureDistanceResult {
        scaled(self.unlabeled_distance.between(unlabeled, labeled), self.unlabeled_loss_multiplier)
    }

    /// Pushes the fake feature mean away from the labeled one. Side `a` is
    /// fake, side `b` labeled.
    pub fn fake_loss(&self, fake: &[&[f32]], labeled: &[&[f32]]) -> FeatureDistanceResult {
        scaled(self.fake_distance.between(fake, labeled), -self.fake_loss_multiplier)
    }

    /// Feature matching for the generator; only the fake side carries a
    /// gradient.
    pub fn generator_loss(&self, fake: &[&[f32]], labeled: &[&[f32]]) -> (f32, Vec<Vec<f32>>) {
        let result = self.generator_distance.between(fake, labeled);
        (result.distance, result.gradients_a)
    }

    /// `m · Σ θ²` and its gradient `2mθ`.
    pub fn norm_loss(&self, weights: &RowBuffer) -> (f32, RowBuffer) {
        let loss = self.norm_loss_multiplier * weights.norm_squared();
        let mut grads = weights.clone();
        grads.scale(2.0 * self.norm_loss_multiplier);
        (loss, grads)
    }

    /// Penalty `m · (‖g‖ − 1)² / batch_size` for one input gradient `g`.
    pub fn gradient_penalty_term(&self, input_gradient: &[f32], batch_size: usize) -> PenaltyTerm {
        let norm = l2_norm_f32(input_gradient);
        let scale = self.gradient_penalty_multiplier / batch_size as f32;
        let loss = scale * (norm - 1.0) * (norm - 1.0);
        if norm == 0.0 {
            return PenaltyTerm { loss, coefficient: 0.0, direction: vec![0.0; input_gradient.len()] };
        }
        PenaltyTerm {
            loss,
            coefficient: 2.0 * scale * (norm - 1.0),
            direction: input_gradient.iter().map(|g| g / norm).collect(),
        }
    }

}

#[cfg(test)]
mod test {
    use super::*;

    fn composer() -> LossComposer {
        LossComposer::from_settings(&Settings::default())
    }

    #[test]
    fn test_labeled_loss_literal() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let prediction = Prediction { density: Plane::zeros(2, 2), count: 0.0 };
        let label = Plane::new_filled(2, 2, 1.0);
        let loss = labeled_loss(&[prediction], &[label])?;
        assert_eq!(loss.loss, 56.0);
        assert_eq!(loss.count_grads, vec![-8.0]);
        assert_eq!(loss.density_grads[0], vec![-20.0; 4]);
        Ok(())
    }

    #[test]
    fn test_labeled_loss_averages_over_batch() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let exact = Prediction { density: Plane::new_filled(2, 2, 1.0), count: 4.0 };
        let zero = Prediction { density: Plane::zeros(2, 2), count: 0.0 };
        let labels = vec![Plane::new_filled(2, 2, 1.0); 2];
        assert_eq!(labeled_loss(&[exact, zero], &labels)?.loss, 28.0);
        Ok(())
    }

    #[test]
    fn test_labeled_loss_rejects_shape_mismatch() {
        let prediction = Prediction { density: Plane::zeros(2, 2), count: 0.0 };
        assert!(labeled_loss(&[prediction.clone()], &[Plane::zeros(3, 2)]).is_err());
        assert!(labeled_loss(&[prediction], &[]).is_err());
    }

    #[test]
    fn test_fake_loss_is_negated_distance() {
        let composer = composer();
        let (fake_features, labeled_features) = ([3.0f32, 4.0], [0f32, 0.0]);
        let fake = vec![&fake_features[..]];
        let labeled = vec![&labeled_features[..]];
        let unlabeled = composer.unlabeled_loss(&fake, &labeled);
        let fake_loss = composer.fake_loss(&fake, &labeled);
        assert!((unlabeled.distance - 25.0).abs() < 1e-4);
        // order 0.5 of a distance of 5
        assert!((fake_loss.distance + 5f32.sqrt()).abs() < 1e-4);
        assert!(fake_loss.gradients_a[0][0] < 0.0);
    }

    #[test]
    fn test_gradient_penalty_term() {
        let composer = composer();
        let term = composer.gradient_penalty_term(&[0.0, 3.0], 2);
        assert!((term.loss - 2.0).abs() < 1e-6);
        assert!((term.coefficient - 2.0).abs() < 1e-6);
        assert_eq!(term.direction, vec![0.0, 1.0]);
        let unit = composer.gradient_penalty_term(&[0.6, 0.8], 1);
        assert!(unit.loss.abs() < 1e-10);
    }

    #[test]
    fn test_norm_loss() {
        let mut composer = composer();
        composer.norm_loss_multiplier = 0.5;
        let mut weights = RowBuffer::new_with_row_sizes(0.0, &[2]);
        weights.get_row_mut(0).copy_from_slice(&[1.0, -2.0]);
        let (loss, grads) = composer.norm_loss(&weights);
        assert_eq!(loss, 2.5);
        assert_eq!(grads.get_row(0), &[1.0, -2.0]);
    }

}
