use std::fmt;

use serde::{Deserialize, Serialize};

use crate::initializer::NetInitializer;
use crate::func::ActivationFn;

pub trait NetLayerBase {
    fn forward_pass(&self, input: &[f32], output: &mut [f32]);
    /// Accumulates (`+=`) the loss gradient with respect to this layer's
    /// parameters into `param_grads` and overwrites `input_grads` with the
    /// gradient with respect to its inputs.
    fn backprop(&self, output_grads: &[f32], inputs: &[f32], outputs: &[f32],
                param_grads: &mut [f32], input_grads: &mut [f32]);
    fn input_size(&self) -> usize;
    fn output_size(&self) -> usize;
    fn weight_buffer_size(&self) -> usize;
    fn write_weights_into(&self, target: &mut [f32]);
    fn read_weights_from(&mut self, source: &[f32]);
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NetLayerConfig {
    FullyConnected(usize, ActivationFn)
}

impl NetLayerConfig {
    pub fn create_layer(
        &self,
        input_size: usize,
        layer_idx: usize,
        initializer: &mut dyn NetInitializer
    ) -> NetLayer {
        match self {
            &NetLayerConfig::FullyConnected(size, activation_fn) => {
                NetLayer::FullyConnected(
                    FullyConnectedNetLayer::new(
                        input_size,
                        size,
                        layer_idx,
                        activation_fn,
                        initializer,
                    )
                )
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NetLayer {
    FullyConnected(FullyConnectedNetLayer)
}

impl NetLayer {

    fn get_delegate(&self) -> &dyn NetLayerBase {
        match self {
            NetLayer::FullyConnected(layer) => layer,
        }
    }

    fn get_delegate_mut(&mut self) -> &mut dyn NetLayerBase {
        match self {
            NetLayer::FullyConnected(layer) => layer,
        }
    }

    pub fn get_config(&self) -> NetLayerConfig {
        match self {
            NetLayer::FullyConnected(layer) => NetLayerConfig::FullyConnected(layer.size, layer.activation_fn),
        }
    }

}

impl NetLayerBase for NetLayer {

    // NOTE: not using delegate functions for most frequently called methods to avoid dynamic dispatch

    fn forward_pass(&self, input: &[f32], output: &mut [f32]) {
        match self {
            NetLayer::FullyConnected(layer) => layer.forward_pass(input, output),
        }
    }

    fn backprop(&self, output_grads: &[f32], inputs: &[f32], outputs: &[f32],
                param_grads: &mut [f32], input_grads: &mut [f32]) {
        match self {
            NetLayer::FullyConnected(layer) => layer.backprop(output_grads, inputs, outputs, param_grads, input_grads),
        }
    }

    fn input_size(&self) -> usize {
        self.get_delegate().input_size()
    }

    fn output_size(&self) -> usize {
        self.get_delegate().output_size()
    }

    fn weight_buffer_size(&self) -> usize {
        self.get_delegate().weight_buffer_size()
    }

    fn write_weights_into(&self, target: &mut [f32]) {
        self.get_delegate().write_weights_into(target)
    }

    fn read_weights_from(&mut self, source: &[f32]) {
        self.get_delegate_mut().read_weights_from(source)
    }

}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct FullyConnectedNetLayer {
    input_size: usize,
    size: usize,
    weights: Vec<f32>,
    biases: Vec<f32>,
    activation_fn: ActivationFn,
}

impl fmt::Debug for FullyConnectedNetLayer {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("FullyConnectedNetLayer")
            .field("input_size", &self.input_size)
            .field("size", &self.size)
            .field("weights", &self.weights.len())
            .field("biases", &self.biases.len())
            .field("activation_fn", &self.activation_fn)
            .finish()
    }
}

impl FullyConnectedNetLayer {

    pub fn new(
        input_size: usize,
        size: usize,
        layer_index: usize,
        activation_fn: ActivationFn,
        initializer: &mut dyn NetInitializer,
    ) -> Self {
        let num_weights = input_size * size;
        let mut weights = Vec::with_capacity(num_weights);
        for _ in 0..num_weights {
            weights.push(initializer.get_weight(layer_index, input_size));
        }
        let mut biases = Vec::with_capacity(size);
        for _ in 0..size {
            biases.push(initializer.get_bias(layer_index));
        }
        FullyConnectedNetLayer {
            input_size,
            size,
            weights,
            biases,
            activation_fn,
        }
    }

    #[inline(always)]
    fn get_weight(&self, input_index: usize, node_index: usize) -> f32 {
        self.weights[input_index * self.size + node_index]
    }

}

impl NetLayerBase for FullyConnectedNetLayer {

    fn forward_pass(&self, input: &[f32], output: &mut [f32]) {

        debug_assert_eq!(input.len(), self.input_size);
        debug_assert_eq!(output.len(), self.size);

        output.copy_from_slice(&self.biases);
        for (input_index, &input_value) in input.iter().enumerate() {
            if input_value == 0.0 {
                continue;
            }
            let row = &self.weights[input_index * self.size..(input_index + 1) * self.size];
            for (sum, weight) in output.iter_mut().zip(row.iter()) {
                *sum += input_value * *weight;
            }
        }
        for value in output.iter_mut() {
            *value = self.activation_fn.get_activation(*value);
        }
    }

    fn backprop(&self, output_grads: &[f32], inputs: &[f32], outputs: &[f32],
                param_grads: &mut [f32], input_grads: &mut [f32]) {

        debug_assert_eq!(output_grads.len(), self.size);
        debug_assert_eq!(input_grads.len(), self.input_size);
        debug_assert_eq!(inputs.len(), self.input_size);
        debug_assert_eq!(outputs.len(), self.size);
        debug_assert_eq!(param_grads.len(), self.weights.len() + self.biases.len());

        let bias_offset = self.weights.len();

        for error in input_grads.iter_mut() {
            *error = 0.0;
        }
        for node_index in 0..self.size {
            // chain the incoming gradient through the activation at this node's output
            let node_error_gradient = self.activation_fn.get_activation_derivative(outputs[node_index])
                * output_grads[node_index];
            if node_error_gradient == 0.0 {
                continue;
            }
            for input_index in 0..self.input_size {
                param_grads[input_index * self.size + node_index] += node_error_gradient * inputs[input_index];
                input_grads[input_index] += self.get_weight(input_index, node_index) * node_error_gradient;
            }
            param_grads[bias_offset + node_index] += node_error_gradient;
        }
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.size
    }

    fn weight_buffer_size(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn write_weights_into(&self, target: &mut [f32]) {
        debug_assert_eq!(target.len(), self.weights.len() + self.biases.len());
        let (weights, biases) = target.split_at_mut(self.weights.len());
        weights.copy_from_slice(&self.weights);
        biases.copy_from_slice(&self.biases);
    }

    fn read_weights_from(&mut self, source: &[f32]) {
        debug_assert_eq!(source.len(), self.weights.len() + self.biases.len());
        let (weights, biases) = source.split_at(self.weights.len());
        self.weights.copy_from_slice(weights);
        self.biases.copy_from_slice(biases);
    }

}

#[cfg(test)]
mod test {
    use super::*;
    use crate::initializer::RandomNetInitializer;

    fn layer(activation_fn: ActivationFn) -> FullyConnectedNetLayer {
        let mut init = RandomNetInitializer::new_standard_with_seed("layer");
        FullyConnectedNetLayer::new(3, 2, 0, activation_fn, &mut init)
    }

    #[test]
    fn test_forward_pass_identity() {
        let mut layer = layer(ActivationFn::Identity);
        layer.read_weights_from(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.5, -0.5]);
        let mut output = [0.0; 2];
        layer.forward_pass(&[1.0, 0.0, -1.0], &mut output);
        // node 0: 1*1 + 0*3 + -1*5 + 0.5, node 1: 1*2 + 0*4 + -1*6 - 0.5
        assert_eq!(output, [-3.5, -4.5]);
    }

    #[test]
    fn test_backprop_matches_finite_differences() {
        let layer = layer(ActivationFn::Tanh);
        let inputs = [0.3, -0.7, 1.1];
        let output_grads = [1.0, -2.0];
        let loss = |layer: &FullyConnectedNetLayer, inputs: &[f32]| {
            let mut output = [0.0; 2];
            layer.forward_pass(inputs, &mut output);
            output[0] * output_grads[0] + output[1] * output_grads[1]
        };

        let mut outputs = [0.0; 2];
        layer.forward_pass(&inputs, &mut outputs);
        let mut param_grads = vec![0.0; layer.weight_buffer_size()];
        let mut input_grads = [0.0; 3];
        layer.backprop(&output_grads, &inputs, &outputs, &mut param_grads, &mut input_grads);

        let h = 1e-3;
        let mut params = vec![0.0; layer.weight_buffer_size()];
        layer.write_weights_into(&mut params);
        for i in 0..params.len() {
            let mut plus = layer.clone();
            let mut shifted = params.clone();
            shifted[i] += h;
            plus.read_weights_from(&shifted);
            let mut minus = layer.clone();
            shifted[i] -= 2.0 * h;
            minus.read_weights_from(&shifted);
            let numeric = (loss(&plus, &inputs) - loss(&minus, &inputs)) / (2.0 * h);
            assert!((numeric - param_grads[i]).abs() < 1e-2, "param {}: {} vs {}", i, numeric, param_grads[i]);
        }
        for i in 0..inputs.len() {
            let mut plus = inputs;
            plus[i] += h;
            let mut minus = inputs;
            minus[i] -= h;
            let numeric = (loss(&layer, &plus) - loss(&layer, &minus)) / (2.0 * h);
            assert!((numeric - input_grads[i]).abs() < 1e-2);
        }
    }

}
