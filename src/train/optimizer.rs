use crate::buffer::RowBuffer;
use crate::net::Net;

/// A first-order update rule applied to a whole net from a gradient buffer
/// shaped like the net's weights.
pub trait Optimizer {
    fn step(&mut self, net: &mut Net, grads: &RowBuffer);
}

/// Adam with optional L2 weight decay folded into the gradient:
/// `g ← g + λθ`, then the bias-corrected Adam update.
#[derive(Clone, Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    t: u64,
    m: Option<RowBuffer>,
    v: Option<RowBuffer>,
}

impl Adam {

    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32, weight_decay: f32) -> Self {
        Adam { learning_rate, beta1, beta2, epsilon, weight_decay, t: 0, m: None, v: None }
    }

    pub fn default_params(learning_rate: f32) -> Self {
        Adam::new(learning_rate, 0.9, 0.999, 1e-8, 0.0)
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

}

impl Optimizer for Adam {

    fn step(&mut self, net: &mut Net, grads: &RowBuffer) {
        let mut weights = net.get_weights();
        debug_assert_eq!(weights.buffer_len(), grads.buffer_len());
        if self.m.is_none() {
            self.m = Some(net.new_zeroed_weight_buffer());
            self.v = Some(net.new_zeroed_weight_buffer());
        }
        self.t += 1;

        let bias1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias2 = 1.0 - self.beta2.powi(self.t as i32);
        let (beta1, beta2, epsilon, weight_decay) = (self.beta1, self.beta2, self.epsilon, self.weight_decay);
        let step_size = self.learning_rate / bias1;

        if let (Some(m), Some(v)) = (self.m.as_mut(), self.v.as_mut()) {
            let params = weights.get_buffer_mut().iter_mut();
            let moments = m.get_buffer_mut().iter_mut().zip(v.get_buffer_mut().iter_mut());
            for ((theta, g), (m, v)) in params.zip(grads.get_buffer().iter()).zip(moments) {
                let g = g + weight_decay * *theta;
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                *theta -= step_size * *m / ((*v / bias2).sqrt() + epsilon);
            }
        }
        net.load_weights_from(&weights);
    }

}

#[cfg(test)]
mod test {
    use super::*;
    use crate::func::ActivationFn;
    use crate::initializer::RandomNetInitializer;
    use crate::net::NetConfig;

    fn tiny_net() -> Net {
        NetConfig::new_fully_connected(2, 1, &[3], ActivationFn::Tanh, ActivationFn::Identity)
            .create_net(&mut RandomNetInitializer::new_standard_with_seed("adam"))
    }

    #[test]
    fn test_first_step_moves_every_weight_by_learning_rate() {
        let mut net = tiny_net();
        let before = net.get_weights();
        let mut grads = net.new_zeroed_weight_buffer();
        for (i, g) in grads.get_buffer_mut().iter_mut().enumerate() {
            *g = if i % 2 == 0 { 0.5 } else { -2.0 };
        }
        let mut adam = Adam::default_params(0.01);
        adam.step(&mut net, &grads);
        let after = net.get_weights();
        for (i, (b, a)) in before.get_buffer().iter().zip(after.get_buffer().iter()).enumerate() {
            let expected = if i % 2 == 0 { -0.01 } else { 0.01 };
            assert!((a - b - expected).abs() < 1e-5, "weight {} moved {}", i, a - b);
        }
    }

    #[test]
    fn test_weight_decay_shrinks_with_zero_gradient() {
        let mut net = tiny_net();
        let before = net.get_weights();
        let grads = net.new_zeroed_weight_buffer();
        let mut adam = Adam::default_params(0.01).with_weight_decay(1e-2);
        adam.step(&mut net, &grads);
        let after = net.get_weights();
        for (b, a) in before.get_buffer().iter().zip(after.get_buffer().iter()) {
            if b.abs() > 0.01 {
                assert!(a.abs() < b.abs());
            }
        }
    }

}
