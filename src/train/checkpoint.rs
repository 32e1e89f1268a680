use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::error::Result;
use crate::model::NetworkTriple;

pub const ESTIMATOR_MODEL_NAME: &str = "DNN_model";
pub const DISCRIMINATOR_MODEL_NAME: &str = "D_model";
pub const GENERATOR_MODEL_NAME: &str = "G_model";

fn model_path(directory: &Path, name: &str, suffix: &str) -> PathBuf {
    directory.join(format!("{}{}.json", name, suffix))
}

fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, value)?;
    Ok(())
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

impl NetworkTriple {

    /// Writes `DNN_model{suffix}.json`, `D_model{suffix}.json` and
    /// `G_model{suffix}.json` into `directory`.
    pub fn save(&self, directory: impl AsRef<Path>, suffix: &str) -> Result<()> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;
        save_json(&self.estimator, &model_path(directory, ESTIMATOR_MODEL_NAME, suffix))?;
        save_json(&self.discriminator, &model_path(directory, DISCRIMINATOR_MODEL_NAME, suffix))?;
        save_json(&self.generator, &model_path(directory, GENERATOR_MODEL_NAME, suffix))?;
        info!(directory = %directory.display(), suffix, "saved models");
        Ok(())
    }

    /// Reads the unsuffixed models written by a completed run.
    pub fn load(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref();
        let triple = NetworkTriple {
            estimator: load_json(&model_path(directory, ESTIMATOR_MODEL_NAME, ""))?,
            discriminator: load_json(&model_path(directory, DISCRIMINATOR_MODEL_NAME, ""))?,
            generator: load_json(&model_path(directory, GENERATOR_MODEL_NAME, ""))?,
        };
        info!(directory = %directory.display(), "loaded models");
        Ok(triple)
    }

}
