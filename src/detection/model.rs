use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::imageops::FilterType;
use ndarray::{Array1, Array2, Array3, Array4, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ForensicsError, Result},
    image_utils::ImageSample,
};

/// Side length of the normalized input tensor.
const INPUT_SIZE: u32 = 256;
const BN_EPSILON: f32 = 1e-5;

/// (input channels, output channels, kernel size, pool size) per conv block.
const CONV_ARCH: [(usize, usize, usize, usize); 4] =
    [(3, 8, 3, 2), (8, 8, 5, 2), (8, 16, 5, 2), (16, 16, 5, 4)];

/// Flattened feature size after the four pooled blocks: 16 channels at 8x8.
const FC_INPUT: usize = 16 * 8 * 8;
const FC_HIDDEN: usize = 16;

/// Serialized weights artifact: flat vectors per layer, shapes fixed by the
/// architecture and validated on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelWeights {
    pub conv: Vec<ConvBlockWeights>,
    pub fc1: DenseWeights,
    pub fc2: DenseWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvBlockWeights {
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
    pub bn_gamma: Vec<f32>,
    pub bn_beta: Vec<f32>,
    pub bn_mean: Vec<f32>,
    pub bn_var: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseWeights {
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

impl ModelWeights {
    /// All-zero weights matching the fixed architecture. A starting template
    /// for weight-conversion tooling, and a fixture for tests.
    pub fn zeroed() -> Self {
        let conv = CONV_ARCH
            .iter()
            .map(|&(input, output, kernel, _)| ConvBlockWeights {
                weight: vec![0.0; output * input * kernel * kernel],
                bias: vec![0.0; output],
                bn_gamma: vec![0.0; output],
                bn_beta: vec![0.0; output],
                bn_mean: vec![0.0; output],
                bn_var: vec![0.0; output],
            })
            .collect();

        Self {
            conv,
            fc1: DenseWeights {
                weight: vec![0.0; FC_HIDDEN * FC_INPUT],
                bias: vec![0.0; FC_HIDDEN],
            },
            fc2: DenseWeights {
                weight: vec![0.0; FC_HIDDEN],
                bias: vec![0.0],
            },
        }
    }
}

struct ConvBlock {
    weight: Array4<f32>,
    bias: Array1<f32>,
    bn_gamma: Array1<f32>,
    bn_beta: Array1<f32>,
    bn_mean: Array1<f32>,
    bn_var: Array1<f32>,
    pool: usize,
}

struct Dense {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

/// Four convolution+pool blocks and a small fully-connected head with a
/// sigmoid output, evaluated directly with `ndarray`.
pub struct MesoNet {
    blocks: Vec<ConvBlock>,
    fc1: Dense,
    fc2: Dense,
}

impl MesoNet {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let weights: ModelWeights = serde_json::from_reader(BufReader::new(file))?;
        Self::from_weights(weights)
    }

    pub fn from_weights(weights: ModelWeights) -> Result<Self> {
        if weights.conv.len() != CONV_ARCH.len() {
            return Err(ForensicsError::InvalidWeights(format!(
                "expected {} conv blocks, found {}",
                CONV_ARCH.len(),
                weights.conv.len()
            )));
        }

        let blocks = weights
            .conv
            .into_iter()
            .zip(CONV_ARCH)
            .enumerate()
            .map(|(index, (block, (input, output, kernel, pool)))| {
                let weight =
                    Array4::from_shape_vec((output, input, kernel, kernel), block.weight)
                        .map_err(|_| shape_error(index, "weight"))?;

                Ok(ConvBlock {
                    weight,
                    bias: channel_vector(block.bias, output, index, "bias")?,
                    bn_gamma: channel_vector(block.bn_gamma, output, index, "bn_gamma")?,
                    bn_beta: channel_vector(block.bn_beta, output, index, "bn_beta")?,
                    bn_mean: channel_vector(block.bn_mean, output, index, "bn_mean")?,
                    bn_var: channel_vector(block.bn_var, output, index, "bn_var")?,
                    pool,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let fc1 = Dense {
            weight: Array2::from_shape_vec((FC_HIDDEN, FC_INPUT), weights.fc1.weight)
                .map_err(|_| dense_shape_error("fc1"))?,
            bias: Array1::from_vec(weights.fc1.bias),
        };
        let fc2 = Dense {
            weight: Array2::from_shape_vec((1, FC_HIDDEN), weights.fc2.weight)
                .map_err(|_| dense_shape_error("fc2"))?,
            bias: Array1::from_vec(weights.fc2.bias),
        };

        if fc1.bias.len() != FC_HIDDEN || fc2.bias.len() != 1 {
            return Err(ForensicsError::InvalidWeights(
                "fully-connected bias length mismatch".into(),
            ));
        }

        Ok(Self { blocks, fc1, fc2 })
    }

    /// Runs the forward pass on a normalized 256x256 tensor and returns the
    /// deepfake probability.
    pub fn infer(&self, sample: &ImageSample) -> Result<f64> {
        let resized = image::imageops::resize(
            &sample.raster,
            INPUT_SIZE,
            INPUT_SIZE,
            FilterType::Lanczos3,
        );

        let mut tensor =
            Array3::<f32>::zeros((3, INPUT_SIZE as usize, INPUT_SIZE as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                tensor[[channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
            }
        }

        for block in &self.blocks {
            tensor = block.forward(&tensor);
        }

        let features = Array1::from_iter(tensor.iter().copied());
        if features.len() != FC_INPUT {
            return Err(ForensicsError::InvalidWeights(format!(
                "feature vector of length {} does not match head input {}",
                features.len(),
                FC_INPUT
            )));
        }

        let hidden = (self.fc1.weight.dot(&features) + &self.fc1.bias).mapv(|v| v.max(0.0));
        let logit = (self.fc2.weight.dot(&hidden) + &self.fc2.bias)[0];

        Ok(1.0 / (1.0 + (-logit as f64).exp()))
    }
}

impl ConvBlock {
    /// Same-padding convolution, batch normalization, ReLU, max pool.
    fn forward(&self, input: &Array3<f32>) -> Array3<f32> {
        let (channels_in, height, width) = input.dim();
        let (channels_out, _, kernel, _) = self.weight.dim();
        let pad = (kernel - 1) / 2;

        let planes: Vec<Array2<f32>> = (0..channels_out)
            .into_par_iter()
            .map(|oc| {
                let kernel_view = self.weight.index_axis(Axis(0), oc);
                let mut plane = Array2::<f32>::zeros((height, width));

                for ic in 0..channels_in {
                    for oy in 0..height {
                        for ox in 0..width {
                            let mut acc = 0.0;
                            for ky in 0..kernel {
                                let iy = oy + ky;
                                if iy < pad || iy >= height + pad {
                                    continue;
                                }
                                let iy = iy - pad;
                                for kx in 0..kernel {
                                    let ix = ox + kx;
                                    if ix < pad || ix >= width + pad {
                                        continue;
                                    }
                                    acc += input[[ic, iy, ix - pad]] * kernel_view[[ic, ky, kx]];
                                }
                            }
                            plane[[oy, ox]] += acc;
                        }
                    }
                }

                let scale = self.bn_gamma[oc] / (self.bn_var[oc] + BN_EPSILON).sqrt();
                let shift = self.bn_beta[oc] - self.bn_mean[oc] * scale;
                let bias = self.bias[oc];
                plane.mapv_inplace(|v| ((v + bias) * scale + shift).max(0.0));
                plane
            })
            .collect();

        let pooled_height = height / self.pool;
        let pooled_width = width / self.pool;
        let mut output = Array3::<f32>::zeros((channels_out, pooled_height, pooled_width));

        for (oc, plane) in planes.iter().enumerate() {
            for py in 0..pooled_height {
                for px in 0..pooled_width {
                    let mut max = f32::NEG_INFINITY;
                    for dy in 0..self.pool {
                        for dx in 0..self.pool {
                            max = max.max(plane[[py * self.pool + dy, px * self.pool + dx]]);
                        }
                    }
                    output[[oc, py, px]] = max;
                }
            }
        }

        output
    }
}

fn channel_vector(values: Vec<f32>, expected: usize, block: usize, name: &str) -> Result<Array1<f32>> {
    if values.len() != expected {
        return Err(shape_error(block, name));
    }
    Ok(Array1::from_vec(values))
}

fn shape_error(block: usize, name: &str) -> ForensicsError {
    ForensicsError::InvalidWeights(format!("conv block {} has malformed {}", block, name))
}

fn dense_shape_error(name: &str) -> ForensicsError {
    ForensicsError::InvalidWeights(format!("{} weight matrix has the wrong shape", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Write;

    fn sample() -> ImageSample {
        let raster = RgbImage::from_pixel(32, 32, Rgb([64, 128, 192]));
        ImageSample {
            raster,
            width: 32,
            height: 32,
            original_width: 32,
            original_height: 32,
            color: image::ColorType::Rgb8,
        }
    }

    #[test]
    fn test_zero_weights_predict_midpoint() {
        // Zero gamma kills every activation; the head outputs its zero bias,
        // so the sigmoid lands exactly on 0.5.
        let model = MesoNet::from_weights(ModelWeights::zeroed()).unwrap();
        let probability = model.infer(&sample()).unwrap();
        assert!((probability - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_head_bias_shifts_probability() {
        let mut weights = ModelWeights::zeroed();
        weights.fc2.bias[0] = 2.0;

        let model = MesoNet::from_weights(weights).unwrap();
        let probability = model.infer(&sample()).unwrap();
        let expected = 1.0 / (1.0 + (-2.0f64).exp());
        assert!((probability - expected).abs() < 1e-6);
    }

    #[test]
    fn test_malformed_shapes_rejected() {
        let mut weights = ModelWeights::zeroed();
        weights.conv[1].bias.pop();
        assert!(MesoNet::from_weights(weights).is_err());

        let mut weights = ModelWeights::zeroed();
        weights.fc1.weight.truncate(10);
        assert!(MesoNet::from_weights(weights).is_err());

        let mut weights = ModelWeights::zeroed();
        weights.conv.pop();
        assert!(MesoNet::from_weights(weights).is_err());
    }

    #[test]
    fn test_load_round_trips_through_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        serde_json::to_writer(&mut file, &ModelWeights::zeroed()).unwrap();
        file.flush().unwrap();

        let model = MesoNet::load(file.path()).unwrap();
        assert!((model.infer(&sample()).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_load_rejects_corrupt_artifact() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        file.flush().unwrap();

        assert!(MesoNet::load(file.path()).is_err());
        assert!(MesoNet::load("/nonexistent/weights.json").is_err());
    }
}
