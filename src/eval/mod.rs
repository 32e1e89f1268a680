mod sliding_window;
mod metrics;

pub use self::{
    sliding_window::*,
    metrics::*,
};
