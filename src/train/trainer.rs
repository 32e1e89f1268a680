use std::{
    fs,
    path::PathBuf,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use rand_xorshift::XorShiftRng;
use tracing::{debug, info, info_span};

use crate::{
    data::{DataSource, Example, FullSceneExample, Image, InMemorySource, PrefetchingSource, SyntheticCrowd},
    error::{CrowdError, Result},
    eval::{evaluation_epoch, PatchAggregator, SlidingWindowTotals},
    initializer::RandomNetInitializer,
    mixture::MixtureSampler,
    model::{CrowdNet, DensityEstimator, NetworkTriple},
    stats::Stats,
    train::{
        density_to_image,
        image_grid,
        ControlChannel,
        ControlEvent,
        CsvSummaryWriter,
        NetworkOptimizers,
        Settings,
        SummaryRecorder,
        TrainingStepProtocol,
        SYNTHETIC_DATASET,
    },
    utils::seeded_rng,
};

const GRID_EXAMPLES: usize = 3;
const GRID_FAKES: usize = 9;

/// Output location of one run: `logs_directory/"{trial_name} t{unix_seconds}"`.
#[derive(Clone, Debug, PartialEq)]
pub struct RunContext {
    pub trial_directory: PathBuf,
}

impl RunContext {

    pub fn create(settings: &Settings) -> Result<Self> {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        let trial_directory = settings.logs_directory.join(format!("{} t{}", settings.trial_name, seconds));
        fs::create_dir_all(&trial_directory)?;
        Ok(RunContext { trial_directory })
    }

    pub fn dnn_summary_directory(&self) -> PathBuf {
        self.trial_directory.join("DNN")
    }

    pub fn gan_summary_directory(&self) -> PathBuf {
        self.trial_directory.join("GAN")
    }

}

/// Every dataset a run touches.
#[derive(Clone, Debug)]
pub struct Datasets {
    pub train: Vec<Example>,
    pub unlabeled: Vec<Image>,
    pub validation: Vec<Example>,
    pub test_scenes: Vec<FullSceneExample>,
}

impl Datasets {

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        match settings.crowd_dataset.as_str() {
            SYNTHETIC_DATASET => Datasets::synthetic(settings),
            other => Err(CrowdError::UnknownDataset(other.to_string())),
        }
    }

    fn synthetic(settings: &Settings) -> Result<Self> {
        let (scene_size, patch_size) = (settings.test_scene_size, settings.patch_size);
        let train = SyntheticCrowd::for_stream(scene_size, patch_size, "labeled", settings.labeled_dataset_seed)
            .patches(settings.labeled_dataset_size)?;
        let unlabeled = SyntheticCrowd::for_stream(scene_size, patch_size, "unlabeled", settings.labeled_dataset_seed)
            .patches(settings.unlabeled_dataset_size)?
            .into_iter()
            .map(|example| example.image)
            .collect();
        let validation = SyntheticCrowd::for_stream(scene_size, patch_size, "validation", 101)
            .patches(settings.validation_dataset_size)?;
        let test_scenes = SyntheticCrowd::for_stream(scene_size, patch_size, "test", 0)
            .scenes(settings.test_scene_count)?;
        info!(
            train = settings.labeled_dataset_size,
            unlabeled = settings.unlabeled_dataset_size,
            validation = settings.validation_dataset_size,
            test_scenes = settings.test_scene_count,
            "synthetic datasets ready"
        );
        Ok(Datasets { train, unlabeled, validation, test_scenes })
    }

}

/// Result of [`Experiment::run`].
#[derive(Debug)]
pub struct RunSummary {
    pub context: RunContext,
    pub steps: usize,
    pub estimator_loss: Stats,
}

/// One training run of the estimator and the GAN over a set of datasets.
#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct Experiment {
    settings: Settings,
    datasets: Datasets,
    /// Networks to start from when no `load_model_path` is set.
    #[builder(setter(into), default)]
    networks: Option<NetworkTriple>,
    #[builder(setter(into), default)]
    control: Option<ControlChannel>,
}

impl Experiment {

    fn initial_networks(&mut self) -> Result<NetworkTriple> {
        let settings = &self.settings;
        if let Some(path) = &settings.load_model_path {
            return NetworkTriple::load(path);
        }
        if let Some(networks) = self.networks.take() {
            return Ok(networks);
        }
        let mut initializer = RandomNetInitializer::new_standard_with_seed(&format!("networks:{}", settings.seed));
        Ok(NetworkTriple::new(settings.patch_size, settings.latent_size, &settings.hidden_layer_sizes, &mut initializer))
    }

    fn data_source(&self) -> Result<Box<dyn DataSource>> {
        let settings = &self.settings;
        let source = InMemorySource::new(
            self.datasets.train.clone(),
            self.datasets.unlabeled.clone(),
            settings.batch_size,
            settings.labeled_dataset_seed,
        )?;
        if settings.prefetch_depth == 0 {
            Ok(Box::new(source))
        } else {
            Ok(Box::new(PrefetchingSource::spawn(source, settings.prefetch_depth)))
        }
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        self.settings.validate()?;
        let context = RunContext::create(&self.settings)?;
        let span = info_span!("run", trial = %self.settings.trial_name);
        let _entered = span.enter();
        info!(directory = %context.trial_directory.display(), "starting run");

        let mut networks = self.initial_networks()?;
        let settings = self.settings.clone();
        let mut dnn_summary = CsvSummaryWriter::create(
            context.dnn_summary_directory(),
            settings.summary_step_period,
            settings.presentation_step_period,
        )?;
        let mut gan_summary = CsvSummaryWriter::create(
            context.gan_summary_directory(),
            settings.summary_step_period,
            settings.presentation_step_period,
        )?;
        let mut source = self.data_source()?;
        let mut optimizers = NetworkOptimizers::from_settings(&settings);
        let mut protocol = TrainingStepProtocol::new(&settings, &networks)?;
        let mut presentation_rng = seeded_rng("presentation", settings.seed);
        let mut estimator_loss = Stats::new();
        let mut interval_loss = Stats::new();
        let mut interval_start = Instant::now();

        for step in 0..settings.steps_to_run {
            if step % settings.summary_step_period == 0 && step != 0 {
                info!(
                    step,
                    elapsed_secs = interval_start.elapsed().as_secs_f32(),
                    estimator_loss = interval_loss.mean(),
                    "training progress"
                );
                interval_loss.reset();
                interval_start = Instant::now();
            }

            let labeled = source.next_labeled_batch()?;
            let unlabeled = source.next_unlabeled_batch()?;
            let report = protocol.run(step, &mut networks, &mut optimizers, &labeled, &unlabeled, &mut dnn_summary, &mut gan_summary)?;
            estimator_loss.report(report.estimator_loss);
            interval_loss.report(report.estimator_loss);

            if dnn_summary.is_summary_step(step) || dnn_summary.is_presentation_step(step) {
                self.validation_summaries(step, &networks, &mut dnn_summary, &mut gan_summary, &mut presentation_rng)?;
            }
            self.handle_control_events(step, &networks, &context)?;
        }

        info!(directory = %context.trial_directory.display(), "completed run");
        if settings.should_save_models {
            networks.save(&context.trial_directory, "")?;
        }
        self.networks = Some(networks);
        Ok(RunSummary {
            context,
            steps: settings.steps_to_run,
            estimator_loss,
        })
    }

    fn handle_control_events(&self, step: usize, networks: &NetworkTriple, context: &RunContext) -> Result<()> {
        let events = match &self.control {
            Some(control) => control.poll(),
            None => return Ok(()),
        };
        for event in events {
            match event {
                ControlEvent::Save => {
                    networks.save(&context.trial_directory, &format!("_{}", step))?;
                    info!(step, "saved models on request");
                }
            }
        }
        Ok(())
    }

    fn validation_summaries(
        &self,
        step: usize,
        networks: &NetworkTriple,
        dnn_summary: &mut dyn SummaryRecorder,
        gan_summary: &mut dyn SummaryRecorder,
        rng: &mut XorShiftRng,
    ) -> Result<()> {
        let settings = &self.settings;
        let datasets = &self.datasets;
        let batch_size = settings.batch_size;

        evaluation_epoch(&networks.estimator, &datasets.train, batch_size, dnn_summary, "2 Train Error", step, None)?;
        let dnn_validation_mae = evaluation_epoch(&networks.estimator, &datasets.validation, batch_size, dnn_summary, "1 Validation Error", step, None)?;
        evaluation_epoch(&networks.discriminator, &datasets.train, batch_size, gan_summary, "2 Train Error", step, None)?;
        let gan_validation_mae = evaluation_epoch(
            &networks.discriminator,
            &datasets.validation,
            batch_size,
            gan_summary,
            "1 Validation Error",
            step,
            Some(dnn_validation_mae),
        )?;
        debug!(step, dnn_validation_mae, gan_validation_mae, "validation summaries");

        if !gan_summary.is_presentation_step(step) {
            return Ok(());
        }
        gan_summary.record_image("Real", &comparison_grid(&networks.discriminator, &datasets.train)?, step)?;
        dnn_summary.record_image("Real", &comparison_grid(&networks.estimator, &datasets.train)?, step)?;
        gan_summary.record_image("Validation", &comparison_grid(&networks.discriminator, &datasets.validation)?, step)?;

        let generator = &networks.generator;
        let samplers = [
            ("Fake/Standard", MixtureSampler::standard_normal()?),
            ("Fake/Offset", MixtureSampler::bimodal(settings.mean_offset as f64)?),
        ];
        for (name, sampler) in samplers.iter() {
            let fakes = sampler
                .sample_batch(rng, GRID_FAKES, generator.latent_size())
                .iter()
                .map(|z| generator.generate(z))
                .collect::<Result<Vec<_>>>()?;
            gan_summary.record_image(name, &image_grid(&fakes, 3)?, step)?;
        }
        Ok(())
    }

    /// Sliding-window evaluation of the estimator over the test scenes.
    pub fn evaluate(&self) -> Result<SlidingWindowTotals> {
        let settings = &self.settings;
        settings.validate()?;
        let loaded;
        let networks = match (&self.networks, &settings.load_model_path) {
            (Some(networks), _) => networks,
            (None, Some(path)) => {
                loaded = NetworkTriple::load(path)?;
                &loaded
            }
            (None, None) => {
                return Err(CrowdError::InvalidSetting(
                    "load_model_path",
                    "no trained or saved networks to evaluate".to_string(),
                ));
            }
        };
        let aggregator = PatchAggregator::new(settings.patch_size, settings.sliding_window_step, settings.batch_size);
        aggregator.evaluate(&networks.estimator, &self.datasets.test_scenes)
    }

}

/// Rows of image, true density and predicted density for the first few
/// examples.
fn comparison_grid(network: &CrowdNet, examples: &[Example]) -> Result<Image> {
    let examples = &examples[..examples.len().min(GRID_EXAMPLES)];
    let images: Vec<Image> = examples.iter().map(|example| example.image.clone()).collect();
    let predictions = network.predict_batch(&images)?;
    let mut tiles = Vec::with_capacity(examples.len() * 3);
    for (example, prediction) in examples.iter().zip(predictions.iter()) {
        let max = example.label.max().max(prediction.density.max());
        tiles.push(example.image.clone());
        tiles.push(density_to_image(&example.label, max)?);
        tiles.push(density_to_image(&prediction.density, max)?);
    }
    image_grid(&tiles, 3)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::train::{control_channel, SettingsBuilder};

    fn tiny_settings(logs_directory: PathBuf) -> Settings {
        SettingsBuilder::default()
            .trial_name("tiny")
            .logs_directory(logs_directory)
            .steps_to_run(3)
            .batch_size(2)
            .patch_size(4)
            .latent_size(3)
            .hidden_layer_sizes(vec![6, 4])
            .summary_step_period(2)
            .presentation_step_period(2)
            .sliding_window_step(2)
            .labeled_dataset_size(4)
            .unlabeled_dataset_size(6)
            .validation_dataset_size(4)
            .test_scene_count(2)
            .test_scene_size(8)
            .build()
            .unwrap()
    }

    #[test]
    fn test_run_saves_models_and_summaries() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let logs = std::env::temp_dir().join("crowd_srgan_trainer_test");
        let _ = fs::remove_dir_all(&logs);
        let settings = tiny_settings(logs.clone());
        let (sender, control) = control_channel();
        sender.send(ControlEvent::Save);

        let mut experiment = ExperimentBuilder::default()
            .datasets(Datasets::from_settings(&settings)?)
            .settings(settings)
            .control(control)
            .build()?;
        let summary = experiment.run()?;
        let trial = summary.context.trial_directory.clone();

        assert_eq!(summary.steps, 3);
        assert_eq!(summary.estimator_loss.count(), 3);
        assert!(trial.join("DNN_model.json").exists());
        assert!(trial.join("G_model_0.json").exists());
        let gan_scalars = fs::read_to_string(trial.join("GAN").join("scalars.csv"))?;
        assert!(gan_scalars.contains("1 Validation Error/Ratio MAE GAN DNN"));
        assert!(trial.join("GAN").join("Fake_Offset_0.ppm").exists());

        let totals = experiment.evaluate()?;
        assert_eq!(totals.scenes, 2);
        assert!(totals.total_count_error.is_finite());

        let warm = SettingsBuilder::default()
            .load_model_path(Some(trial.clone()))
            .patch_size(4)
            .build()?;
        let reloaded = ExperimentBuilder::default()
            .datasets(Datasets::from_settings(&tiny_settings(logs.clone()))?)
            .settings(warm)
            .build()?;
        assert_eq!(reloaded.evaluate()?.scenes, 2);

        fs::remove_dir_all(&logs)?;
        Ok(())
    }

    #[test]
    fn test_invalid_settings_fail_before_training() {
        let logs = std::env::temp_dir().join("crowd_srgan_invalid_settings_test");
        let mut settings = tiny_settings(logs.clone());
        settings.application = "age".to_string();
        let datasets = Datasets::from_settings(&tiny_settings(logs.clone())).unwrap();
        let mut experiment = ExperimentBuilder::default()
            .settings(settings)
            .datasets(datasets)
            .build()
            .unwrap();
        assert!(experiment.run().is_err());
        assert!(!logs.exists());
        assert!(experiment.evaluate().is_err());
    }

    #[test]
    fn test_evaluate_rejects_zero_window_step() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let logs = std::env::temp_dir().join("crowd_srgan_zero_step_test");
        let settings = tiny_settings(logs.clone());
        let datasets = Datasets::from_settings(&settings)?;
        let networks = NetworkTriple::new(
            settings.patch_size,
            settings.latent_size,
            &settings.hidden_layer_sizes,
            &mut RandomNetInitializer::new_standard_with_seed("zero step"),
        );
        let mut stepless = settings;
        stepless.sliding_window_step = 0;
        let experiment = ExperimentBuilder::default()
            .settings(stepless)
            .datasets(datasets)
            .networks(networks)
            .build()?;
        match experiment.evaluate() {
            Err(CrowdError::InvalidSetting(name, _)) => assert_eq!(name, "sliding_window_step"),
            other => panic!("expected an invalid sliding_window_step, got {:?}", other.map(|totals| totals.scenes)),
        }
        assert!(!logs.exists());
        Ok(())
    }

    #[test]
    fn test_datasets_reject_scene_smaller_than_patch() {
        let mut settings = tiny_settings(std::env::temp_dir().join("crowd_srgan_small_scene_test"));
        settings.test_scene_size = settings.patch_size - 1;
        match Datasets::from_settings(&settings) {
            Err(CrowdError::InvalidSetting(name, _)) => assert_eq!(name, "test_scene_size"),
            other => panic!("expected an invalid test_scene_size, got {:?}", other.map(|datasets| datasets.train.len())),
        }
    }

}
