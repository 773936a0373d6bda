use crate::latent::Latent;
use crate::traits::LatentCodec;
use anyhow::Context;
use candle_core::Tensor;
use log::info;
use rand::Rng;
use tensor_util::blend::{blend_images, BlendMode};
use tensor_util::colorspace::{adjust_saturation, channel_means};
use tensor_util::resample::{nchw_to_nhwc, nhwc_to_nchw, random_resized_crop};
use tensor_util::sampling::rnorm_like;
use tensor_util::traits::{ResampleOps, ScalarStatOps};
use tensor_util::warp::elastic_warp;

/// internal scaling of the noise blend rate, kept from the reference
/// pipeline so the knob's useful range stays [0, 1]
const NOISE_BLEND_SCALE: f64 = 1. / 2.25;

/// Structured noise synthesis settings
///
/// * `magnitude` - elastic warp displacement strength, >= 0
/// * `smoothness` - elastic warp displacement smoothness, >= 0
/// * `noise_intensity` - multiplier on the raw Gaussian noise, [0, 1]
/// * `noise_resize_factor` - crop-and-rescale divisor; 0 keeps raw
///   per-pixel noise, k > 0 crops the noise to 1/k of each dimension
///   and upscales it back for a coarse, blotchy structure
/// * `noise_blend_rate` - blend rate between warped image and noise,
///   [0, 1], scaled by 1/2.25 internally
/// * `saturation_correction` - saturation factor, 1.0 = no-op
/// * `blend_mode` - how to fold a batch into a single image before
///   warping; `Off` keeps the batch as is
/// * `blend_rate` - strength of the batch fold, [0, 1]
#[derive(Debug, Clone)]
pub struct NoiseFromImage {
    pub magnitude: f32,
    pub smoothness: f32,
    pub noise_intensity: f32,
    pub noise_resize_factor: usize,
    pub noise_blend_rate: f64,
    pub saturation_correction: f64,
    pub blend_mode: BlendMode,
    pub blend_rate: f64,
}

impl Default for NoiseFromImage {
    fn default() -> Self {
        Self {
            magnitude: 210.,
            smoothness: 3.,
            noise_intensity: 1.,
            noise_resize_factor: 2,
            noise_blend_rate: 0.,
            saturation_correction: 1.,
            blend_mode: BlendMode::Off,
            blend_rate: 0.25,
        }
    }
}

/// The synthesized noise field and, when a codec was supplied, its
/// latent encoding
pub struct NoiseField {
    pub image: Tensor,
    pub latent: Option<Latent>,
}

impl NoiseFromImage {
    /// Derive a pseudo-structured noise image from `images_nhwc`
    ///
    /// The image batch is optionally folded into one image, elastically
    /// warped (border fill = per-channel batch mean), optionally
    /// saturation-corrected, and summed with coarse-structured Gaussian
    /// noise. The result is deliberately not clamped; downstream
    /// samplers handle out-of-range values.
    pub fn synthesize<R: Rng>(
        &self,
        images_nhwc: &Tensor,
        rng: &mut R,
        codec: Option<&dyn LatentCodec>,
    ) -> anyhow::Result<NoiseField> {
        let (batch, _, _, channels) = images_nhwc
            .dims4()
            .context("noise synthesis expects an (N, H, W, C) image batch")?;

        let images = if channels > 3 {
            images_nhwc.narrow(3, 0, 3)?.contiguous()?
        } else {
            images_nhwc.clone()
        };

        let images = if self.blend_mode != BlendMode::Off && batch > 1 {
            info!("folding {} images with {:?}", batch, self.blend_mode);
            fold_batch(&images, self.blend_mode, self.blend_rate)?
        } else {
            images
        };

        let noise = rnorm_like(&images, self.noise_intensity, rng)?;
        let noise_nchw = nhwc_to_nchw(&noise)?;

        let img_nchw = nhwc_to_nchw(&images)?;
        let (_, _, height, width) = img_nchw.dims4()?;

        let fill = channel_means(&img_nchw)?;
        let warped = elastic_warp(&img_nchw, self.magnitude, self.smoothness, &fill, rng)?;

        let warped = adjust_saturation(&warped, self.saturation_correction)?;

        let resized_noise = if self.noise_resize_factor > 0 {
            let crop_h = (height / self.noise_resize_factor).max(1);
            let crop_w = (width / self.noise_resize_factor).max(1);
            let coarse = random_resized_crop(&noise_nchw, crop_h, crop_w, rng)?;
            nchw_to_nhwc(&coarse.resize_bilinear(height, width)?)?
        } else {
            noise
        };

        let result = (nchw_to_nhwc(&warped)?
            + resized_noise.affine(self.noise_blend_rate * NOISE_BLEND_SCALE, 0.)?)?;

        let latent = match codec {
            Some(codec) => Some(
                codec
                    .encode(&result)
                    .context("codec failed to encode the noise field")?,
            ),
            None => None,
        };

        Ok(NoiseField {
            image: result,
            latent,
        })
    }
}

/// Left-fold a batch into its first image, renormalizing by the
/// running max so intensities stay bounded
fn fold_batch(images_nhwc: &Tensor, mode: BlendMode, rate: f64) -> anyhow::Result<Tensor> {
    let batch = images_nhwc.dims4()?.0;

    let mut acc = images_nhwc.narrow(0, 0, 1)?.contiguous()?;
    for i in 1..batch {
        let overlay = images_nhwc.narrow(0, i, 1)?.contiguous()?;
        let folded = blend_images(&acc, &overlay, mode, rate)?;
        let max_value = folded.max_scalar()?;
        acc = folded.affine(1. / max_value as f64, 0.)?;
    }
    Ok(acc)
}
