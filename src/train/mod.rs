mod settings;
mod loss;
mod optimizer;
mod summary;
mod checkpoint;
mod control;
mod step;
mod trainer;

pub use self::{
    settings::*,
    loss::*,
    optimizer::*,
    summary::*,
    checkpoint::*,
    control::*,
    step::*,
    trainer::*,
};
