use serde::{Deserialize, Serialize};

use crate::{
    buffer::{Plane, RowBuffer},
    data::{Image, IMAGE_CHANNELS},
    error::{CrowdError, Result},
    func::ActivationFn,
    initializer::NetInitializer,
    net::{ForwardTrace, Net, NetConfig},
};

/// Per-patch output of an estimator-shaped network.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub density: Plane,
    pub count: f32,
}

/// Anything that maps fixed-size patches to density maps and counts.
pub trait DensityEstimator {
    fn patch_size(&self) -> usize;
    fn predict_batch(&self, images: &[Image]) -> Result<Vec<Prediction>>;
}

/// Network for the estimator (DNN) and discriminator (D) roles: a flattened
/// `3 × patch × patch` image in, `patch × patch` density values followed by
/// one count out. Its last hidden layer provides the features used for
/// feature matching.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrowdNet {
    patch_size: usize,
    net: Net,
}

/// A recorded forward pass of a [`CrowdNet`].
pub struct CrowdForward {
    trace: ForwardTrace,
    patch_size: usize,
}

impl CrowdForward {

    pub fn density_values(&self) -> &[f32] {
        let area = self.patch_size * self.patch_size;
        &self.trace.output()[..area]
    }

    pub fn density(&self) -> Result<Plane> {
        Plane::from_vec(self.patch_size, self.patch_size, self.density_values().to_vec())
    }

    pub fn count(&self) -> f32 {
        self.trace.output()[self.patch_size * self.patch_size]
    }

    pub fn features(&self) -> &[f32] {
        self.trace.features()
    }

    pub fn prediction(&self) -> Result<Prediction> {
        Ok(Prediction {
            density: self.density()?,
            count: self.count(),
        })
    }

}

impl CrowdNet {

    pub fn new(patch_size: usize, hidden_layer_sizes: &[usize], initializer: &mut dyn NetInitializer) -> Self {
        let area = patch_size * patch_size;
        let config = NetConfig::new_fully_connected(
            IMAGE_CHANNELS * area,
            area + 1,
            hidden_layer_sizes,
            ActivationFn::standard_leaky_relu(),
            ActivationFn::Identity,
        );
        CrowdNet {
            patch_size,
            net: config.create_net(initializer),
        }
    }

    fn check_image(&self, image: &Image) -> Result<()> {
        if image.height() != self.patch_size || image.width() != self.patch_size {
            return Err(CrowdError::ShapeMismatch(
                "network input",
                self.patch_size * self.patch_size,
                image.height() * image.width(),
            ));
        }
        Ok(())
    }

    pub fn forward(&self, image: &Image) -> Result<CrowdForward> {
        self.check_image(image)?;
        Ok(CrowdForward {
            trace: self.net.forward(image.as_slice()),
            patch_size: self.patch_size,
        })
    }

    /// Backpropagates gradients on the density map, the count and
    /// optionally the feature layer. Returns the gradient with respect to
    /// the input image.
    pub fn backward(
        &self,
        forward: &CrowdForward,
        density_grads: &[f32],
        count_grad: f32,
        feature_grads: Option<&[f32]>,
        param_grads: &mut RowBuffer,
    ) -> Vec<f32> {
        let mut output_grads = Vec::with_capacity(self.net.output_size());
        output_grads.extend_from_slice(density_grads);
        output_grads.push(count_grad);
        self.net.backward(&forward.trace, &output_grads, feature_grads, param_grads)
    }

    #[inline]
    pub fn net(&self) -> &Net {
        &self.net
    }

    #[inline]
    pub fn net_mut(&mut self) -> &mut Net {
        &mut self.net
    }

}

impl DensityEstimator for CrowdNet {

    fn patch_size(&self) -> usize {
        self.patch_size
    }

    fn predict_batch(&self, images: &[Image]) -> Result<Vec<Prediction>> {
        images.iter()
            .map(|image| self.forward(image)?.prediction())
            .collect()
    }

}

/// Generator network: a latent vector in, a `tanh`-bounded image out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratorNet {
    latent_size: usize,
    patch_size: usize,
    net: Net,
}

impl GeneratorNet {

    pub fn new(latent_size: usize, patch_size: usize, hidden_layer_sizes: &[usize], initializer: &mut dyn NetInitializer) -> Self {
        let config = NetConfig::new_fully_connected(
            latent_size,
            IMAGE_CHANNELS * patch_size * patch_size,
            hidden_layer_sizes,
            ActivationFn::standard_leaky_relu(),
            ActivationFn::Tanh,
        );
        GeneratorNet {
            latent_size,
            patch_size,
            net: config.create_net(initializer),
        }
    }

    pub fn forward(&self, latent: &[f32]) -> Result<ForwardTrace> {
        if latent.len() != self.latent_size {
            return Err(CrowdError::ShapeMismatch("latent vector", self.latent_size, latent.len()));
        }
        Ok(self.net.forward(latent))
    }

    pub fn image(&self, trace: &ForwardTrace) -> Result<Image> {
        Image::from_vec(self.patch_size, self.patch_size, trace.output().to_vec())
    }

    pub fn generate(&self, latent: &[f32]) -> Result<Image> {
        self.image(&self.forward(latent)?)
    }

    pub fn backward(&self, trace: &ForwardTrace, image_grads: &[f32], param_grads: &mut RowBuffer) {
        self.net.backward(trace, image_grads, None, param_grads);
    }

    #[inline]
    pub fn latent_size(&self) -> usize {
        self.latent_size
    }

    #[inline]
    pub fn net(&self) -> &Net {
        &self.net
    }

    #[inline]
    pub fn net_mut(&mut self) -> &mut Net {
        &mut self.net
    }

}

/// The three independently parameterized networks of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkTriple {
    pub estimator: CrowdNet,
    pub discriminator: CrowdNet,
    pub generator: GeneratorNet,
}

impl NetworkTriple {

    pub fn new(
        patch_size: usize,
        latent_size: usize,
        hidden_layer_sizes: &[usize],
        initializer: &mut dyn NetInitializer,
    ) -> Self {
        NetworkTriple {
            estimator: CrowdNet::new(patch_size, hidden_layer_sizes, initializer),
            discriminator: CrowdNet::new(patch_size, hidden_layer_sizes, initializer),
            generator: GeneratorNet::new(latent_size, patch_size, &[hidden_layer_sizes[0]], initializer),
        }
    }

}

#[cfg(test)]
mod test {
    use super::*;
    use crate::initializer::RandomNetInitializer;

    #[test]
    fn test_crowd_net_output_layout() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let net = CrowdNet::new(4, &[8, 6], &mut RandomNetInitializer::new_standard_with_seed("crowd"));
        let forward = net.forward(&Image::zeros(4, 4))?;
        assert_eq!(forward.density()?.len(), 16);
        assert_eq!(forward.features().len(), 6);
        assert_eq!(net.predict_batch(&[Image::zeros(4, 4), Image::zeros(4, 4)])?.len(), 2);
        assert!(net.forward(&Image::zeros(3, 4)).is_err());
        Ok(())
    }

    #[test]
    fn test_generator_images_are_bounded() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let generator = GeneratorNet::new(5, 4, &[12], &mut RandomNetInitializer::new_standard_with_seed("gen"));
        let image = generator.generate(&[30.0, -20.0, 10.0, 5.0, -40.0])?;
        assert_eq!((image.height(), image.width()), (4, 4));
        assert!(image.as_slice().iter().all(|v| v.abs() <= 1.0));
        assert!(generator.generate(&[1.0]).is_err());
        Ok(())
    }

}
