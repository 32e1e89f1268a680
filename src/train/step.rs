use rand::Rng;
use rand_xorshift::XorShiftRng;

use crate::{
    buffer::RowBuffer,
    data::{Image, LabeledBatch},
    error::Result,
    mixture::MixtureSampler,
    model::{CrowdForward, CrowdNet, NetworkTriple, Prediction},
    train::{labeled_loss, Adam, LossComposer, Optimizer, Settings, SummaryRecorder},
    utils::seeded_rng,
};

/// Step along the normalized input gradient used to differentiate the
/// gradient penalty with respect to the discriminator's parameters.
const PENALTY_FINITE_DIFFERENCE_STEP: f32 = 1e-3;

/// Weight decay of the estimator and discriminator optimizers.
const DISCRIMINATIVE_WEIGHT_DECAY: f32 = 1e-2;

/// Position within one training step. Each phase finishes its forward pass,
/// backward pass and update before the next one starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepPhase {
    Estimator,
    Discriminator,
    Generator,
    Complete,
}

impl StepPhase {

    pub fn next(self, step: usize, generator_training_step_period: usize) -> StepPhase {
        match self {
            StepPhase::Estimator => StepPhase::Discriminator,
            StepPhase::Discriminator if step % generator_training_step_period == 0 => StepPhase::Generator,
            StepPhase::Discriminator => StepPhase::Complete,
            StepPhase::Generator | StepPhase::Complete => StepPhase::Complete,
        }
    }

}

/// One optimizer per network, each with its own moment estimates.
pub struct NetworkOptimizers {
    pub estimator: Adam,
    pub discriminator: Adam,
    pub generator: Adam,
}

impl NetworkOptimizers {

    pub fn from_settings(settings: &Settings) -> Self {
        NetworkOptimizers {
            estimator: Adam::default_params(settings.learning_rate).with_weight_decay(DISCRIMINATIVE_WEIGHT_DECAY),
            discriminator: Adam::default_params(settings.learning_rate).with_weight_decay(DISCRIMINATIVE_WEIGHT_DECAY),
            generator: Adam::default_params(settings.learning_rate),
        }
    }

}

/// Losses of one step, before any summary-period filtering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepReport {
    pub estimator_loss: f32,
    pub real_loss: f32,
    pub unlabeled_loss: f32,
    pub fake_loss: f32,
    pub gradient_penalty: f32,
    pub discriminator_loss: f32,
    pub generator_loss: Option<f32>,
    pub phases: Vec<StepPhase>,
}

fn forward_all(net: &CrowdNet, images: &[Image]) -> Result<Vec<CrowdForward>> {
    images.iter().map(|image| net.forward(image)).collect()
}

fn predictions_of(forwards: &[CrowdForward]) -> Result<Vec<Prediction>> {
    forwards.iter().map(CrowdForward::prediction).collect()
}

fn features_of(forwards: &[CrowdForward]) -> Vec<&[f32]> {
    forwards.iter().map(CrowdForward::features).collect()
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / count as f32 }
}

/// Runs the estimator, discriminator and generator updates of one step.
/// Every network accumulates into its own gradient buffer.
pub struct TrainingStepProtocol {
    composer: LossComposer,
    latent_sampler: MixtureSampler,
    rng: XorShiftRng,
    latent_size: usize,
    generator_training_step_period: usize,
    estimator_grads: RowBuffer,
    discriminator_grads: RowBuffer,
    generator_grads: RowBuffer,
    scratch_grads: RowBuffer,
}

impl TrainingStepProtocol {

    pub fn new(settings: &Settings, networks: &NetworkTriple) -> Result<Self> {
        Ok(TrainingStepProtocol {
            composer: LossComposer::from_settings(settings),
            latent_sampler: MixtureSampler::standard_normal()?,
            rng: seeded_rng("training step", settings.seed),
            latent_size: settings.latent_size,
            generator_training_step_period: settings.generator_training_step_period,
            estimator_grads: networks.estimator.net().new_zeroed_weight_buffer(),
            discriminator_grads: networks.discriminator.net().new_zeroed_weight_buffer(),
            generator_grads: networks.generator.net().new_zeroed_weight_buffer(),
            scratch_grads: networks.discriminator.net().new_zeroed_weight_buffer(),
        })
    }

    pub fn run(
        &mut self,
        step: usize,
        networks: &mut NetworkTriple,
        optimizers: &mut NetworkOptimizers,
        labeled: &LabeledBatch,
        unlabeled: &[Image],
        dnn_summary: &mut dyn SummaryRecorder,
        gan_summary: &mut dyn SummaryRecorder,
    ) -> Result<StepReport> {
        let mut report = StepReport::default();
        let mut phase = StepPhase::Estimator;
        while phase != StepPhase::Complete {
            match phase {
                StepPhase::Estimator => {
                    self.estimator_phase(step, networks, &mut optimizers.estimator, labeled, dnn_summary, &mut report)?;
                }
                StepPhase::Discriminator => {
                    self.discriminator_phase(step, networks, &mut optimizers.discriminator, labeled, unlabeled, gan_summary, &mut report)?;
                }
                StepPhase::Generator => {
                    self.generator_phase(step, networks, &mut optimizers.generator, labeled, gan_summary, &mut report)?;
                }
                StepPhase::Complete => {}
            }
            report.phases.push(phase);
            phase = phase.next(step, self.generator_training_step_period);
        }
        Ok(report)
    }

    fn sample_fakes(&mut self, networks: &NetworkTriple, batch_size: usize) -> Result<Vec<Image>> {
        self.latent_sampler
            .sample_batch(&mut self.rng, batch_size, self.latent_size)
            .iter()
            .map(|z| networks.generator.generate(z))
            .collect()
    }

    fn estimator_phase(
        &mut self,
        step: usize,
        networks: &mut NetworkTriple,
        optimizer: &mut Adam,
        labeled: &LabeledBatch,
        summary: &mut dyn SummaryRecorder,
        report: &mut StepReport,
    ) -> Result<()> {
        let estimator = &networks.estimator;
        let forwards = forward_all(estimator, &labeled.images)?;
        let predictions = predictions_of(&forwards)?;
        let loss = labeled_loss(&predictions, &labeled.labels)?;

        self.estimator_grads.reset_to(0.0);
        for (i, forward) in forwards.iter().enumerate() {
            estimator.backward(forward, &loss.density_grads[i], loss.count_grads[i], None, &mut self.estimator_grads);
        }
        let gradient_norm = self.estimator_grads.norm();
        optimizer.step(networks.estimator.net_mut(), &self.estimator_grads);

        report.estimator_loss = loss.loss;
        summary.record_scalar("Loss/Labeled", loss.loss, step)?;
        summary.record_scalar("Count/Predicted Mean", mean(predictions.iter().map(|p| p.count)), step)?;
        summary.record_scalar("Count/True Mean", mean(labeled.labels.iter().map(|l| l.sum())), step)?;
        summary.record_scalar("Gradient Norm/DNN", gradient_norm, step)?;
        Ok(())
    }

    fn discriminator_phase(
        &mut self,
        step: usize,
        networks: &mut NetworkTriple,
        optimizer: &mut Adam,
        labeled: &LabeledBatch,
        unlabeled: &[Image],
        summary: &mut dyn SummaryRecorder,
        report: &mut StepReport,
    ) -> Result<()> {
        let fakes = self.sample_fakes(networks, labeled.len())?;
        let discriminator = &networks.discriminator;

        let labeled_forwards = forward_all(discriminator, &labeled.images)?;
        let unlabeled_forwards = forward_all(discriminator, unlabeled)?;
        let fake_forwards = forward_all(discriminator, &fakes)?;

        let predictions = predictions_of(&labeled_forwards)?;
        let real = labeled_loss(&predictions, &labeled.labels)?;
        let labeled_features = features_of(&labeled_forwards);
        let unlabeled_loss = self.composer.unlabeled_loss(&features_of(&unlabeled_forwards), &labeled_features);
        let fake_loss = self.composer.fake_loss(&features_of(&fake_forwards), &labeled_features);

        self.discriminator_grads.reset_to(0.0);
        let no_density_grads = vec![0f32; discriminator.net().output_size() - 1];
        for (i, forward) in labeled_forwards.iter().enumerate() {
            let feature_grads: Vec<f32> = unlabeled_loss.gradients_b[i].iter()
                .zip(fake_loss.gradients_b[i].iter())
                .map(|(u, f)| u + f)
                .collect();
            discriminator.backward(forward, &real.density_grads[i], real.count_grads[i], Some(&feature_grads), &mut self.discriminator_grads);
        }
        for (forward, feature_grads) in unlabeled_forwards.iter().zip(unlabeled_loss.gradients_a.iter()) {
            discriminator.backward(forward, &no_density_grads, 0.0, Some(feature_grads), &mut self.discriminator_grads);
        }
        for (forward, feature_grads) in fake_forwards.iter().zip(fake_loss.gradients_a.iter()) {
            discriminator.backward(forward, &no_density_grads, 0.0, Some(feature_grads), &mut self.discriminator_grads);
        }

        let mut gradient_penalty = 0.0;
        if self.composer.gradient_penalty_multiplier != 0.0 {
            let rng = &mut self.rng;
            let interpolated: Vec<Image> = labeled.images.iter()
                .zip(fakes.iter())
                .map(|(real, fake)| real.interpolate(fake, rng.gen_range(0.0, 1.0)))
                .collect();
            gradient_penalty = gradient_penalty_into(
                &self.composer,
                discriminator,
                &interpolated,
                &mut self.discriminator_grads,
                &mut self.scratch_grads,
            )?;
        }

        let gradient_norm = self.discriminator_grads.norm();
        optimizer.step(networks.discriminator.net_mut(), &self.discriminator_grads);

        report.real_loss = real.loss;
        report.unlabeled_loss = unlabeled_loss.distance;
        report.fake_loss = fake_loss.distance;
        report.gradient_penalty = gradient_penalty;
        report.discriminator_loss = real.loss + unlabeled_loss.distance + fake_loss.distance + gradient_penalty;
        summary.record_scalar("Loss/Labeled", real.loss, step)?;
        summary.record_scalar("Loss/Unlabeled", unlabeled_loss.distance, step)?;
        summary.record_scalar("Loss/Fake", fake_loss.distance, step)?;
        summary.record_scalar("Loss/Gradient Penalty", gradient_penalty, step)?;
        summary.record_scalar("Loss/Discriminator", report.discriminator_loss, step)?;
        summary.record_scalar("Count/Predicted Mean", mean(predictions.iter().map(|p| p.count)), step)?;
        summary.record_scalar("Count/True Mean", mean(labeled.labels.iter().map(|l| l.sum())), step)?;
        summary.record_scalar("Gradient Norm/D", gradient_norm, step)?;
        Ok(())
    }

    fn generator_phase(
        &mut self,
        step: usize,
        networks: &mut NetworkTriple,
        optimizer: &mut Adam,
        labeled: &LabeledBatch,
        summary: &mut dyn SummaryRecorder,
        report: &mut StepReport,
    ) -> Result<()> {
        let generator = &networks.generator;
        let discriminator = &networks.discriminator;
        let traces = self.latent_sampler
            .sample_batch(&mut self.rng, labeled.len(), self.latent_size)
            .iter()
            .map(|z| generator.forward(z))
            .collect::<Result<Vec<_>>>()?;
        let fakes = traces.iter()
            .map(|trace| generator.image(trace))
            .collect::<Result<Vec<_>>>()?;

        let labeled_forwards = forward_all(discriminator, &labeled.images)?;
        let fake_forwards = forward_all(discriminator, &fakes)?;
        let (feature_loss, feature_grads) = self.composer.generator_loss(
            &features_of(&fake_forwards),
            &features_of(&labeled_forwards),
        );

        self.generator_grads.reset_to(0.0);
        let no_density_grads = vec![0f32; discriminator.net().output_size() - 1];
        for ((trace, forward), feature_grads) in traces.iter().zip(fake_forwards.iter()).zip(feature_grads.iter()) {
            // D's parameter gradients from this pass are discarded
            self.scratch_grads.reset_to(0.0);
            let image_grads = discriminator.backward(forward, &no_density_grads, 0.0, Some(feature_grads), &mut self.scratch_grads);
            generator.backward(trace, &image_grads, &mut self.generator_grads);
        }
        let (norm_loss, norm_grads) = self.composer.norm_loss(&generator.net().get_weights());
        self.generator_grads.add_with_multiplier(&norm_grads, 1.0);

        let gradient_norm = self.generator_grads.norm();
        optimizer.step(networks.generator.net_mut(), &self.generator_grads);

        let loss = feature_loss + norm_loss;
        report.generator_loss = Some(loss);
        summary.record_scalar("Loss/Generator", loss, step)?;
        summary.record_scalar("Gradient Norm/G", gradient_norm, step)?;
        Ok(())
    }

}

/// Adds the parameter gradient of the gradient penalty over `interpolated`
/// into `param_grads` and returns the penalty. The scalar is the
/// discriminator's count output. Differentiating `‖∇ₓ s‖` with respect to
/// the parameters uses a central difference of `∇θ s` along the
/// normalized input gradient.
pub(crate) fn gradient_penalty_into(
    composer: &LossComposer,
    discriminator: &CrowdNet,
    interpolated: &[Image],
    param_grads: &mut RowBuffer,
    scratch: &mut RowBuffer,
) -> Result<f32> {
    let no_density_grads = vec![0f32; discriminator.net().output_size() - 1];
    let epsilon = PENALTY_FINITE_DIFFERENCE_STEP;
    let mut penalty = 0.0;
    for image in interpolated {
        let forward = discriminator.forward(image)?;
        scratch.reset_to(0.0);
        let input_gradient = discriminator.backward(&forward, &no_density_grads, 1.0, None, scratch);
        let term = composer.gradient_penalty_term(&input_gradient, interpolated.len());
        penalty += term.loss;
        if term.coefficient == 0.0 {
            continue;
        }
        let multiplier = term.coefficient / (2.0 * epsilon);
        for (sign, offset) in [(1.0f32, epsilon), (-1.0, -epsilon)].iter() {
            let shifted = discriminator.forward(&image.offset_along(&term.direction, *offset)?)?;
            scratch.reset_to(0.0);
            discriminator.backward(&shifted, &no_density_grads, 1.0, None, scratch);
            param_grads.add_with_multiplier(scratch, sign * multiplier);
        }
    }
    Ok(penalty)
}
