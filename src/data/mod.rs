mod example;
mod source;
mod prefetch;
mod synthetic;

pub use self::{
    example::*,
    source::*,
    prefetch::*,
    synthetic::*,
};
