#[macro_use]
extern crate quick_error;

#[macro_use]
extern crate derive_builder;

mod buffer;
mod data;
mod error;
mod eval;
mod func;
mod initializer;
mod layer;
mod mixture;
mod model;
mod net;
mod stats;
mod train;
mod utils;

use std::env;
use std::error::Error;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::train::{spawn_stdin_listener, Datasets, ExperimentBuilder, Settings, SettingsSweep};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    Registry::default().with(filter).with(fmt_layer).init();
}

fn main() -> Result<(), Box<dyn Error>> {

    init_tracing();

    let sweep = match env::args().nth(1) {
        Some(path) => SettingsSweep::from_json_file(path)?,
        None => SettingsSweep::single(Settings::default()),
    };
    let settings_list = sweep.expand();
    for settings in &settings_list {
        settings.validate()?;
    }

    // type `save` and enter to checkpoint the running trial
    let control = spawn_stdin_listener();

    for settings in settings_list {
        let datasets = Datasets::from_settings(&settings)?;
        let mut experiment = ExperimentBuilder::default()
            .settings(settings)
            .datasets(datasets)
            .control(control.clone())
            .build()?;
        let summary = experiment.run()?;
        let totals = experiment.evaluate()?;
        println!(
            "{}: steps = {}, mean estimator loss = {}, total count = {}, total count error = {}, total density error = {}",
            summary.context.trial_directory.display(),
            summary.steps,
            summary.estimator_loss.mean(),
            totals.total_count,
            totals.total_count_error,
            totals.total_density_error,
        );
    }

    Ok(())

}
