use crate::latent::Latent;
use candle_core::{Result, Tensor};
use std::sync::Arc;

/// One denoiser invocation over a partial step range
///
/// `start_step == last_step` is an identity pass; out-of-range indices
/// are the denoiser's to reject.
#[derive(Debug, Clone)]
pub struct SampleSpec<'a> {
    pub seed: u64,
    pub steps: usize,
    pub cfg: f64,
    pub sampler_name: &'a str,
    pub scheduler: &'a str,
    pub denoise: f64,
    pub disable_noise: bool,
    pub start_step: usize,
    pub last_step: usize,
    pub force_full_denoise: bool,
}

/// The external iterative denoiser
///
/// The model handle and the conditioning payloads are opaque to this
/// crate; only the step-range contract matters here.
pub trait Denoiser {
    type Model: GuidancePatch;
    type Conditioning;

    fn sample(
        &self,
        model: &Self::Model,
        spec: &SampleSpec<'_>,
        positive: &Self::Conditioning,
        negative: &Self::Conditioning,
        latent: &Latent,
    ) -> anyhow::Result<Latent>;
}

/// The external image codec
pub trait LatentCodec {
    /// encode an `(N, H, W, 3)` image into the codec's latent space
    fn encode(&self, image_nhwc: &Tensor) -> anyhow::Result<Latent>;
}

/// Per-step classifier-free-guidance arguments, in the model's native
/// numerical space
pub struct GuidanceArgs<'a> {
    pub input: &'a Tensor,
    pub cond: &'a Tensor,
    pub uncond: &'a Tensor,
    pub cond_scale: f64,
    pub sigma: f64,
}

/// A guidance strategy the sampler can install on a model
pub trait GuidanceFn: Send + Sync {
    fn guide(&self, args: GuidanceArgs<'_>) -> Result<Tensor>;
}

/// Clone-on-write installation of a guidance function; the original
/// model handle is never mutated
pub trait GuidancePatch: Sized {
    fn with_guidance(&self, guidance: Arc<dyn GuidanceFn>) -> Self;
}
