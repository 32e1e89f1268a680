use core::slice;

use serde::{Deserialize, Serialize};

use crate::{
    layer::{
        NetLayer,
        NetLayerBase,
        NetLayerConfig,
    },
    buffer::RowBuffer,
    initializer::NetInitializer,
    func::ActivationFn,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetConfig {
    input_size: usize,
    layers: Vec<NetLayerConfig>,
}

impl NetConfig {

    /// Fully connected layers of `hidden_layer_sizes` followed by an output
    /// layer. The last hidden layer is the net's feature layer, so at least
    /// one hidden layer is required.
    pub fn new_fully_connected(
        input_size: usize,
        output_size: usize,
        hidden_layer_sizes: impl AsRef<[usize]>,
        hidden_activation_fn: ActivationFn,
        output_activation_fn: ActivationFn,
    ) -> Self {
        let hidden_layer_sizes = hidden_layer_sizes.as_ref();
        assert!(input_size > 0);
        assert!(output_size > 0);
        assert!(!hidden_layer_sizes.is_empty());
        let mut layers: Vec<NetLayerConfig> = Vec::with_capacity(hidden_layer_sizes.len() + 1);
        for layer_size in hidden_layer_sizes {
            assert!(*layer_size > 0);
            layers.push(NetLayerConfig::FullyConnected(*layer_size, hidden_activation_fn));
        }
        layers.push(NetLayerConfig::FullyConnected(output_size, output_activation_fn));
        NetConfig {
            input_size,
            layers
        }
    }

    pub fn create_net(&self, initializer: &mut dyn NetInitializer) -> Net {

        assert!(self.input_size > 0);
        assert!(self.layers.len() > 1);

        let mut layers = Vec::with_capacity(self.layers.len());
        let mut layer_input_size = self.input_size;
        for (layer_idx, layer_config) in self.layers.iter().enumerate() {
            let layer = layer_config.create_layer(layer_input_size, layer_idx, initializer);
            layer_input_size = layer.output_size();
            layers.push(layer);
        }
        Net {
            input_size: self.input_size,
            output_size: layer_input_size,
            feature_layer: layers.len() - 2,
            layers
        }

    }

}

/// Activations recorded by a forward pass, needed to backpropagate through
/// the same pass later.
#[derive(Clone, Debug)]
pub struct ForwardTrace {
    input: Vec<f32>,
    outputs: RowBuffer,
    feature_layer: usize,
}

impl ForwardTrace {

    #[inline]
    pub fn output(&self) -> &[f32] {
        self.outputs.get_last_row()
    }

    #[inline]
    pub fn features(&self) -> &[f32] {
        self.outputs.get_row(self.feature_layer)
    }

}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Net {
    input_size: usize,
    output_size: usize,
    feature_layer: usize,
    layers: Vec<NetLayer>,
}

impl Net {

    pub fn forward(&self, input: &[f32]) -> ForwardTrace {

        debug_assert_eq!(input.len(), self.input_size);

        let layer_sizes: Vec<usize> = self.layer_iter()
            .map(NetLayerBase::output_size)
            .collect();
        let mut outputs = RowBuffer::new_with_row_sizes(0.0, &layer_sizes);

        self.layers[0].forward_pass(input, outputs.get_row_mut(0));
        for layer_index in 1..self.layers.len() {
            let (layer_input, layer_output) = outputs.split_adjacent_rows(layer_index - 1);
            self.layers[layer_index].forward_pass(layer_input, layer_output);
        }

        ForwardTrace {
            input: input.to_vec(),
            outputs,
            feature_layer: self.feature_layer,
        }
    }

    /// Backpropagates `output_grads` (and optionally `feature_grads`, the
    /// gradient with respect to the feature layer's activations) through the
    /// pass recorded in `trace`. Parameter gradients are accumulated into
    /// `param_grads`; the gradient with respect to the input is returned.
    pub fn backward(
        &self,
        trace: &ForwardTrace,
        output_grads: &[f32],
        feature_grads: Option<&[f32]>,
        param_grads: &mut RowBuffer,
    ) -> Vec<f32> {

        debug_assert_eq!(output_grads.len(), self.output_size);
        debug_assert_eq!(param_grads.num_rows(), self.layers.len());

        let mut grads = output_grads.to_vec();
        for layer_index in (0..self.layers.len()).rev() {
            if layer_index == self.feature_layer {
                if let Some(feature_grads) = feature_grads {
                    debug_assert_eq!(feature_grads.len(), grads.len());
                    for (g, f) in grads.iter_mut().zip(feature_grads.iter()) {
                        *g += *f;
                    }
                }
            }
            let layer = &self.layers[layer_index];
            let inputs = if layer_index == 0 {
                trace.input.as_slice()
            } else {
                trace.outputs.get_row(layer_index - 1)
            };
            let mut input_grads = vec![0f32; layer.input_size()];
            layer.backprop(
                &grads,
                inputs,
                trace.outputs.get_row(layer_index),
                param_grads.get_row_mut(layer_index),
                &mut input_grads,
            );
            grads = input_grads;
        }
        grads
    }

    #[inline]
    pub fn layer_iter(&self) -> slice::Iter<NetLayer> {
        self.layers.iter()
    }

    #[inline]
    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn store_weights_into(&self, buffer: &mut RowBuffer) {
        debug_assert_eq!(buffer.num_rows(), self.layers.len());
        for i in 0..self.layers.len() {
            self.layers[i].write_weights_into(buffer.get_row_mut(i));
        }
    }

    pub fn load_weights_from(&mut self, buffer: &RowBuffer) {
        debug_assert_eq!(buffer.num_rows(), self.layers.len());
        for i in 0..self.layers.len() {
            self.layers[i].read_weights_from(buffer.get_row(i));
        }
    }

    pub fn new_zeroed_weight_buffer(&self) -> RowBuffer {
        let layer_sizes: Vec<usize> = self.layer_iter()
            .map(NetLayerBase::weight_buffer_size)
            .collect();
        RowBuffer::new_with_row_sizes(0.0, layer_sizes)
    }

    pub fn get_weights(&self) -> RowBuffer {
        let mut buf = self.new_zeroed_weight_buffer();
        self.store_weights_into(&mut buf);
        buf
    }

    pub fn get_config(&self) -> NetConfig {
        let layers: Vec<NetLayerConfig> = self.layer_iter()
            .map(NetLayer::get_config)
            .collect();
        NetConfig {
            input_size: self.input_size,
            layers
        }
    }

}

#[cfg(test)]
mod test {
    use super::*;
    use crate::initializer::RandomNetInitializer;

    fn test_net() -> Net {
        let config = NetConfig::new_fully_connected(
            4,
            2,
            [5, 3],
            ActivationFn::Tanh,
            ActivationFn::Identity,
        );
        config.create_net(&mut RandomNetInitializer::new_standard_with_seed("net"))
    }

    #[test]
    fn test_weight_buffer() {

        let mut net = test_net();

        let mut buf = net.new_zeroed_weight_buffer();
        let mut buf2 = net.new_zeroed_weight_buffer();

        assert_eq!(buf.num_rows(), 3);
        assert_eq!(buf.get_row(0).len(), 4 * 5 + 5);
        assert_eq!(buf.get_row(1).len(), 5 * 3 + 3);
        assert_eq!(buf.get_row(2).len(), 3 * 2 + 2);

        for (i, element) in buf.get_buffer_mut().iter_mut().enumerate() {
            *element = i as f32;
        }

        net.load_weights_from(&buf);
        net.store_weights_into(&mut buf2);

        for (i, element) in buf2.get_buffer().iter().enumerate() {
            assert_eq!(i as f32, *element);
        }

    }

    #[test]
    fn test_config_round_trip_fully_connected() {
        let net = test_net();
        assert_eq!(net.get_config().create_net(&mut RandomNetInitializer::new_standard_with_seed("x")).get_config(), net.get_config());
        assert_eq!(net.forward(&[0.0; 4]).features().len(), 3);
    }

    #[test]
    fn test_backward_with_feature_grads_matches_finite_differences() {
        let net = test_net();
        let input = [0.2, -0.4, 0.9, 0.1];
        let output_seed = [0.5, -1.0];
        let feature_seed = [1.0, 0.0, -0.5];
        let objective = |net: &Net, input: &[f32]| {
            let trace = net.forward(input);
            let out: f32 = trace.output().iter().zip(output_seed.iter()).map(|(a, b)| a * b).sum();
            let feat: f32 = trace.features().iter().zip(feature_seed.iter()).map(|(a, b)| a * b).sum();
            out + feat
        };

        let trace = net.forward(&input);
        let mut param_grads = net.new_zeroed_weight_buffer();
        let input_grads = net.backward(&trace, &output_seed, Some(&feature_seed), &mut param_grads);

        let h = 1e-3;
        for i in 0..input.len() {
            let mut plus = input;
            plus[i] += h;
            let mut minus = input;
            minus[i] -= h;
            let numeric = (objective(&net, &plus) - objective(&net, &minus)) / (2.0 * h);
            assert!((numeric - input_grads[i]).abs() < 1e-2, "input {}: {} vs {}", i, numeric, input_grads[i]);
        }

        let weights = net.get_weights();
        for i in (0..weights.buffer_len()).step_by(7) {
            let mut shifted = weights.clone();
            shifted.get_buffer_mut()[i] += h;
            let mut plus = net.clone();
            plus.load_weights_from(&shifted);
            shifted.get_buffer_mut()[i] -= 2.0 * h;
            let mut minus = net.clone();
            minus.load_weights_from(&shifted);
            let numeric = (objective(&plus, &input) - objective(&minus, &input)) / (2.0 * h);
            let analytic = param_grads.get_buffer()[i];
            assert!((numeric - analytic).abs() < 1e-2, "param {}: {} vs {}", i, numeric, analytic);
        }
    }

}
