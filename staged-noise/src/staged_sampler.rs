use crate::latent::Latent;
use crate::rescale_cfg::{rescale_active, RescaleCfg};
use crate::traits::{Denoiser, GuidancePatch, SampleSpec};
use anyhow::Context;
use candle_core::Tensor;
use log::{info, warn};
use std::sync::Arc;
use tensor_util::composite::composite;
use tensor_util::resample::common_upscale;

/// edge feather width of the final masked composite, in latent cells
const COMPOSITE_FEATHER: usize = 8;

/// One staged-injection request
///
/// `latent_image` is the working latent; its `empty` flag selects the
/// masked-compositing strategy. `latent_noise` and `mask` are optional
/// branch selectors, not requirements.
pub struct StagedSampleArgs<'a, D: Denoiser> {
    pub model: &'a D::Model,
    pub seed: u64,
    pub steps: usize,
    pub cfg: f64,
    pub cfg_noise: f64,
    pub sampler_name: &'a str,
    pub scheduler: &'a str,
    pub positive: &'a D::Conditioning,
    pub negative: &'a D::Conditioning,
    pub latent_image: &'a Latent,
    pub noise_strength: f64,
    pub latent_noise: Option<&'a Latent>,
    pub mask: Option<&'a Tensor>,
    pub inject_time: f64,
    pub denoise: f64,
}

/// Two-phase denoise around a noise-injection step
///
/// Phase A denoises the working latent up to the injection step; the
/// partial result is blended against an externally synthesized noise
/// latent and Phase B finishes the denoise from there, optionally under
/// a rescaled guidance function and with a final masked composite.
pub struct StagedSampler<'d, D: Denoiser> {
    denoiser: &'d D,
}

impl<'d, D: Denoiser> StagedSampler<'d, D> {
    pub fn new(denoiser: &'d D) -> Self {
        Self { denoiser }
    }

    pub fn sample(&self, args: &StagedSampleArgs<'_, D>) -> anyhow::Result<Latent> {
        let inject_at_step = inject_step(args.steps, args.inject_time);
        info!("injecting at step {} of {}", inject_at_step, args.steps);

        info!("phase A: sampling base latent");
        let base = self
            .denoiser
            .sample(
                args.model,
                &SampleSpec {
                    seed: args.seed,
                    steps: args.steps,
                    cfg: args.cfg,
                    sampler_name: args.sampler_name,
                    scheduler: args.scheduler,
                    denoise: args.denoise,
                    disable_noise: false,
                    start_step: 0,
                    last_step: inject_at_step,
                    force_full_denoise: true,
                },
                args.positive,
                args.negative,
                args.latent_image,
            )
            .context("phase A (base pass) failed")?;

        // an empty working latent gives phase A nothing to composite
        // against outside the mask, so render a full fallback image
        let fallback = if args.mask.is_some() && args.latent_image.empty {
            info!("phase A: empty latent with mask, sampling full fallback image");
            Some(
                self.denoiser
                    .sample(
                        args.model,
                        &SampleSpec {
                            seed: args.seed,
                            steps: args.steps,
                            cfg: args.cfg,
                            sampler_name: args.sampler_name,
                            scheduler: args.scheduler,
                            denoise: 1.0,
                            disable_noise: false,
                            start_step: 0,
                            last_step: args.steps,
                            force_full_denoise: false,
                        },
                        args.positive,
                        args.negative,
                        args.latent_image,
                    )
                    .context("fallback full pass failed")?,
            )
        } else {
            None
        };

        // a non-empty masked latent already has valid content outside
        // the mask; seed phase B from it directly
        let seed_latent = if args.mask.is_some() && !args.latent_image.empty {
            Latent::non_empty(args.latent_image.clone_samples())
        } else {
            base
        };

        let injected = blend_noise(&seed_latent, args.latent_noise, args.noise_strength)?;

        let patched;
        let phase_b_model = if rescale_active(args.cfg_noise) {
            info!("cfg {} > 8.0, rescaling guidance for phase B", args.cfg_noise);
            patched = args.model.with_guidance(Arc::new(RescaleCfg::default()));
            &patched
        } else {
            args.model
        };

        info!("phase B: applying noise");
        let mut result = self
            .denoiser
            .sample(
                phase_b_model,
                &SampleSpec {
                    seed: args.seed,
                    steps: args.steps,
                    cfg: args.cfg_noise,
                    sampler_name: args.sampler_name,
                    scheduler: args.scheduler,
                    denoise: args.denoise,
                    disable_noise: false,
                    start_step: inject_at_step,
                    last_step: args.steps,
                    force_full_denoise: false,
                },
                args.positive,
                args.negative,
                &injected,
            )
            .context("phase B (injection pass) failed")?;

        if let Some(mask) = args.mask {
            info!("compositing through mask");
            let destination = if !args.latent_image.empty {
                args.latent_image.clone_samples()
            } else {
                fallback
                    .as_ref()
                    .map(Latent::clone_samples)
                    .context("empty masked latent without a fallback pass")?
            };

            result.samples = composite(
                &destination,
                &result.samples,
                0,
                0,
                mask,
                COMPOSITE_FEATHER,
            )
            .context("masked composite failed")?;
        }

        result.empty = false;
        Ok(result)
    }
}

/// `round(steps * inject_time)` with ties to even, so an odd schedule
/// at the default halfway point injects at the earlier step; values
/// past the end of the schedule are passed through for the denoiser to
/// reject
pub fn inject_step(steps: usize, inject_time: f64) -> usize {
    let raw = (steps as f64 * inject_time).round_ties_even();
    if raw < 0. {
        warn!("inject_time {} rounds below step 0, clamping", inject_time);
        return 0;
    }
    raw as usize
}

/// injected = seed * (1 - strength) + noise * strength, reconciling the
/// noise latent's spatial shape to the seed first; a missing noise
/// latent degrades to the seed itself
fn blend_noise(
    seed: &Latent,
    latent_noise: Option<&Latent>,
    noise_strength: f64,
) -> anyhow::Result<Latent> {
    let noise = match latent_noise {
        Some(noise) => noise,
        None => {
            warn!("no latent noise supplied, degrading to a plain two-phase sample");
            return Ok(Latent::non_empty(seed.clone_samples()));
        }
    };

    let (_, _, sh, sw) = seed.dims().context("blend seed latent")?;
    let noise_samples = reconcile_shape(&noise.samples, sh, sw)?;

    let blended = (seed.samples.affine(1. - noise_strength, 0.)?
        + noise_samples.affine(noise_strength, 0.)?)?;

    Ok(Latent::non_empty(blended))
}

/// center-crop + bicubic resize of a latent to `(h, w)`, identity when
/// shapes already agree
fn reconcile_shape(noise: &Tensor, h: usize, w: usize) -> anyhow::Result<Tensor> {
    let (_, _, nh, nw) = noise
        .dims4()
        .context("latent noise must be (N, C, H, W)")?;

    if (nh, nw) == (h, w) {
        return Ok(noise.clone());
    }

    common_upscale(noise, h, w).with_context(|| {
        format!(
            "cannot reconcile latent noise ({}, {}) to ({}, {})",
            nh, nw, h, w
        )
    })
}
