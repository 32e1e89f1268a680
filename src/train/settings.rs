use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use itertools::iproduct;
use serde::{Deserialize, Serialize};

use crate::error::{CrowdError, Result};

pub const CROWD_APPLICATION: &str = "crowd";
pub const SYNTHETIC_DATASET: &str = "synthetic";

/// Hyperparameters and run options of one training run. Every field has a
/// default, so both the builder and a JSON file may name only what differs.
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(pattern = "owned", default)]
#[serde(default)]
pub struct Settings {
    #[builder(setter(into))]
    pub application: String,
    #[builder(setter(into))]
    pub crowd_dataset: String,
    #[builder(setter(into))]
    pub trial_name: String,
    #[builder(setter(into))]
    pub logs_directory: PathBuf,
    pub load_model_path: Option<PathBuf>,
    pub should_save_models: bool,

    pub steps_to_run: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub unlabeled_loss_multiplier: f32,
    pub fake_loss_multiplier: f32,
    pub gradient_penalty_multiplier: f32,
    pub norm_loss_multiplier: f32,
    pub mean_offset: f32,
    pub unlabeled_loss_order: f32,
    pub fake_loss_order: f32,
    pub generator_loss_order: f32,
    pub generator_training_step_period: usize,
    pub summary_step_period: usize,
    pub presentation_step_period: usize,
    pub sliding_window_step: usize,

    pub patch_size: usize,
    pub latent_size: usize,
    pub hidden_layer_sizes: Vec<usize>,
    pub prefetch_depth: usize,
    pub labeled_dataset_seed: u64,
    pub labeled_dataset_size: usize,
    pub unlabeled_dataset_size: usize,
    pub validation_dataset_size: usize,
    pub test_scene_count: usize,
    pub test_scene_size: usize,
    pub seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            application: CROWD_APPLICATION.to_string(),
            crowd_dataset: SYNTHETIC_DATASET.to_string(),
            trial_name: "srgan".to_string(),
            logs_directory: PathBuf::from("logs"),
            load_model_path: None,
            should_save_models: true,
            steps_to_run: 1000,
            batch_size: 16,
            learning_rate: 1e-4,
            unlabeled_loss_multiplier: 1.0,
            fake_loss_multiplier: 1.0,
            gradient_penalty_multiplier: 1.0,
            norm_loss_multiplier: 0.0,
            mean_offset: 2.0,
            unlabeled_loss_order: 2.0,
            fake_loss_order: 0.5,
            generator_loss_order: 2.0,
            generator_training_step_period: 1,
            summary_step_period: 100,
            presentation_step_period: 500,
            sliding_window_step: 4,
            patch_size: 8,
            latent_size: 16,
            hidden_layer_sizes: vec![64, 32],
            prefetch_depth: 2,
            labeled_dataset_seed: 0,
            labeled_dataset_size: 50,
            unlabeled_dataset_size: 500,
            validation_dataset_size: 100,
            test_scene_count: 4,
            test_scene_size: 32,
            seed: 0,
        }
    }
}

fn require_positive(name: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(CrowdError::InvalidSetting(name, "must be greater than zero".to_string()));
    }
    Ok(())
}

fn require_positive_order(name: &'static str, value: f32) -> Result<()> {
    if !(value > 0.0) {
        return Err(CrowdError::InvalidSetting(name, format!("order must be positive, got {}", value)));
    }
    Ok(())
}

impl Settings {

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Rejects settings that cannot produce a run, before anything is
    /// allocated.
    pub fn validate(&self) -> Result<()> {
        if self.application != CROWD_APPLICATION {
            return Err(CrowdError::UnknownApplication(self.application.clone()));
        }
        if self.crowd_dataset != SYNTHETIC_DATASET {
            return Err(CrowdError::UnknownDataset(self.crowd_dataset.clone()));
        }
        require_positive("batch_size", self.batch_size)?;
        require_positive("generator_training_step_period", self.generator_training_step_period)?;
        require_positive("summary_step_period", self.summary_step_period)?;
        require_positive("presentation_step_period", self.presentation_step_period)?;
        require_positive("sliding_window_step", self.sliding_window_step)?;
        require_positive("patch_size", self.patch_size)?;
        require_positive("latent_size", self.latent_size)?;
        require_positive("labeled_dataset_size", self.labeled_dataset_size)?;
        require_positive("unlabeled_dataset_size", self.unlabeled_dataset_size)?;
        require_positive("validation_dataset_size", self.validation_dataset_size)?;
        require_positive_order("unlabeled_loss_order", self.unlabeled_loss_order)?;
        require_positive_order("fake_loss_order", self.fake_loss_order)?;
        require_positive_order("generator_loss_order", self.generator_loss_order)?;
        if self.hidden_layer_sizes.is_empty() || self.hidden_layer_sizes.contains(&0) {
            return Err(CrowdError::InvalidSetting(
                "hidden_layer_sizes",
                format!("needs at least one non-empty layer, got {:?}", self.hidden_layer_sizes),
            ));
        }
        if self.test_scene_size < self.patch_size {
            return Err(CrowdError::InvalidSetting(
                "test_scene_size",
                format!("{} is smaller than the patch size {}", self.test_scene_size, self.patch_size),
            ));
        }
        Ok(())
    }

    /// Hyperparameter summary used as the trial directory name, e.g.
    /// `srgan ul1e0 fl1e-1 le50 gp1e1 bg2e0 lr1e-4 nl0 gs1 ls0 u2f0.5g2`.
    pub fn summarized_trial_name(&self, prefix: &str) -> String {
        let mut name = format!(
            "{} ul{:e} fl{:e} le{} gp{:e} bg{:e} lr{:e} nl{} gs{} ls{} u{}f{}g{}",
            prefix,
            self.unlabeled_loss_multiplier,
            self.fake_loss_multiplier,
            self.labeled_dataset_size,
            self.gradient_penalty_multiplier,
            self.mean_offset,
            self.learning_rate,
            self.norm_loss_multiplier,
            self.generator_training_step_period,
            self.labeled_dataset_seed,
            self.unlabeled_loss_order,
            self.fake_loss_order,
            self.generator_loss_order,
        );
        if self.load_model_path.is_some() {
            name.push_str(" l");
        }
        name
    }

}

/// A base [`Settings`] plus value lists for the swept hyperparameters. An
/// empty list keeps the base value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSweep {
    pub base: Settings,
    pub learning_rate: Vec<f32>,
    pub unlabeled_loss_multiplier: Vec<f32>,
    pub fake_loss_multiplier: Vec<f32>,
    pub gradient_penalty_multiplier: Vec<f32>,
    pub norm_loss_multiplier: Vec<f32>,
    pub fake_loss_order: Vec<f32>,
    pub labeled_dataset_seed: Vec<u64>,
}

fn or_base<T: Clone>(values: &[T], base: T) -> Vec<T> {
    if values.is_empty() {
        vec![base]
    } else {
        values.to_vec()
    }
}

impl SettingsSweep {

    pub fn single(base: Settings) -> Self {
        SettingsSweep { base, ..SettingsSweep::default() }
    }

    /// Reads either a sweep (an object with a `base` key) or a plain
    /// settings object, which becomes a single-entry sweep.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let value: serde_json::Value = serde_json::from_reader(reader)?;
        if value.get("base").is_some() {
            Ok(serde_json::from_value(value)?)
        } else {
            Ok(SettingsSweep::single(serde_json::from_value(value)?))
        }
    }

    /// Cartesian product of every list, each entry named after its
    /// hyperparameters with the base trial name as prefix.
    pub fn expand(&self) -> Vec<Settings> {
        let base = &self.base;
        iproduct!(
            or_base(&self.learning_rate, base.learning_rate),
            or_base(&self.unlabeled_loss_multiplier, base.unlabeled_loss_multiplier),
            or_base(&self.fake_loss_multiplier, base.fake_loss_multiplier),
            or_base(&self.gradient_penalty_multiplier, base.gradient_penalty_multiplier),
            or_base(&self.norm_loss_multiplier, base.norm_loss_multiplier),
            or_base(&self.fake_loss_order, base.fake_loss_order),
            or_base(&self.labeled_dataset_seed, base.labeled_dataset_seed)
        )
            .map(|(lr, ul, fl, gp, nl, fo, ls)| {
                let mut settings = base.clone();
                settings.learning_rate = lr;
                settings.unlabeled_loss_multiplier = ul;
                settings.fake_loss_multiplier = fl;
                settings.gradient_penalty_multiplier = gp;
                settings.norm_loss_multiplier = nl;
                settings.fake_loss_order = fo;
                settings.labeled_dataset_seed = ls;
                settings.trial_name = settings.summarized_trial_name(&base.trial_name);
                settings
            })
            .collect()
    }

}
