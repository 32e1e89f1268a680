mod row;
mod plane;

pub use self::{
    row::*,
    plane::*,
};
