use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ActivationFn {
    Identity,
    LeakyRelu {
        negative_slope: f32,
    },
    Tanh
}

impl ActivationFn {

    pub fn standard_leaky_relu() -> Self {
        ActivationFn::LeakyRelu {
            negative_slope: 0.01
        }
    }

    pub fn get_activation(&self, n: f32) -> f32 {
        match self {
            ActivationFn::Identity => n,
            &ActivationFn::LeakyRelu { negative_slope } => {
                if n > 0.0 { n } else { negative_slope * n }
            },
            ActivationFn::Tanh => n.tanh(),
        }
    }

    /// Derivative of the activation expressed through its output value `y`,
    /// which is what a recorded forward pass keeps.
    pub fn get_activation_derivative(&self, y: f32) -> f32 {
        match self {
            ActivationFn::Identity => 1.0,
            &ActivationFn::LeakyRelu { negative_slope } => {
                if y > 0.0 { 1.0 } else { negative_slope }
            },
            ActivationFn::Tanh => 1.0 - y * y,
        }
    }

}
