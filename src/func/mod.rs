mod activation;
mod distance;

pub use self::{
    activation::*,
    distance::*,
};
