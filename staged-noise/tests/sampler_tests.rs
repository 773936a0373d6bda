use approx::assert_relative_eq;
use candle_core::{Device, Tensor};
use staged_noise::latent::Latent;
use staged_noise::staged_sampler::{inject_step, StagedSampleArgs, StagedSampler};
use staged_noise::traits::{Denoiser, GuidanceFn, GuidancePatch, SampleSpec};
use std::cell::RefCell;
use std::sync::Arc;

#[derive(Clone)]
struct StubModel {
    patched: bool,
}

impl GuidancePatch for StubModel {
    fn with_guidance(&self, _guidance: Arc<dyn GuidanceFn>) -> Self {
        StubModel { patched: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RecordedCall {
    cfg: f64,
    denoise: f64,
    start_step: usize,
    last_step: usize,
    force_full_denoise: bool,
    patched: bool,
    latent_dims: (usize, usize, usize, usize),
    latent_first: f32,
}

/// Denoiser stub that records every call and adds 1.0 to the latent
struct StubDenoiser {
    calls: RefCell<Vec<RecordedCall>>,
}

impl StubDenoiser {
    fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl Denoiser for StubDenoiser {
    type Model = StubModel;
    type Conditioning = ();

    fn sample(
        &self,
        model: &StubModel,
        spec: &SampleSpec<'_>,
        _positive: &Self::Conditioning,
        _negative: &Self::Conditioning,
        latent: &Latent,
    ) -> anyhow::Result<Latent> {
        let first = latent
            .samples
            .flatten_all()?
            .to_vec1::<f32>()?[0];
        self.calls.borrow_mut().push(RecordedCall {
            cfg: spec.cfg,
            denoise: spec.denoise,
            start_step: spec.start_step,
            last_step: spec.last_step,
            force_full_denoise: spec.force_full_denoise,
            patched: model.patched,
            latent_dims: latent.samples.dims4()?,
            latent_first: first,
        });
        Ok(Latent::non_empty(latent.samples.affine(1., 1.)?))
    }
}

fn base_args<'a, D: Denoiser<Model = StubModel, Conditioning = ()>>(
    model: &'a StubModel,
    latent_image: &'a Latent,
) -> StagedSampleArgs<'a, D> {
    StagedSampleArgs {
        model,
        seed: 7,
        steps: 30,
        cfg: 8.0,
        cfg_noise: 7.5,
        sampler_name: "euler",
        scheduler: "normal",
        positive: &(),
        negative: &(),
        latent_image,
        noise_strength: 0.5,
        latent_noise: None,
        mask: None,
        inject_time: 0.5,
        denoise: 1.0,
    }
}

fn ones_latent(n: usize, c: usize, h: usize, w: usize) -> Latent {
    Latent::non_empty(Tensor::full(1.0_f32, (n, c, h, w), &Device::Cpu).expect("latent"))
}

#[test]
fn inject_step_rounding() {
    assert_eq!(inject_step(30, 0.5), 15);
    assert_eq!(inject_step(10, 0.33), 3);
    assert_eq!(inject_step(10, 0.0), 0);
    assert_eq!(inject_step(10, 1.0), 10);
}

#[test]
fn inject_step_rounds_ties_to_even() {
    assert_eq!(inject_step(5, 0.5), 2);
    assert_eq!(inject_step(7, 0.5), 4);
    assert_eq!(inject_step(9, 0.5), 4);
    assert_eq!(inject_step(5, 0.25), 1);
}

#[test]
fn degraded_run_is_two_phases_with_documented_ranges() -> anyhow::Result<()> {
    let denoiser = StubDenoiser::new();
    let sampler = StagedSampler::new(&denoiser);
    let model = StubModel { patched: false };
    let latent = Latent::zeros(1, 4, 8, 8)?;

    let result = sampler.sample(&base_args(&model, &latent))?;

    let calls = denoiser.calls.borrow();
    assert_eq!(calls.len(), 2);

    assert_eq!(calls[0].start_step, 0);
    assert_eq!(calls[0].last_step, 15);
    assert!(calls[0].force_full_denoise);
    assert_relative_eq!(calls[0].cfg, 8.0);

    assert_eq!(calls[1].start_step, 15);
    assert_eq!(calls[1].last_step, 30);
    assert!(!calls[1].force_full_denoise);
    assert_relative_eq!(calls[1].cfg, 7.5);

    // stub adds 1 per phase; without noise the blend passes phase A through
    let first = result.samples.flatten_all()?.to_vec1::<f32>()?[0];
    assert_relative_eq!(first, 2.0, epsilon = 1e-6);
    assert!(!result.empty);
    Ok(())
}

#[test]
fn empty_latent_with_mask_runs_a_fallback_pass() -> anyhow::Result<()> {
    let denoiser = StubDenoiser::new();
    let sampler = StagedSampler::new(&denoiser);
    let model = StubModel { patched: false };
    let latent = Latent::zeros(1, 4, 8, 8)?;
    let mask = Tensor::full(1.0_f32, (8, 8), &Device::Cpu)?;

    let mut args = base_args(&model, &latent);
    args.mask = Some(&mask);
    sampler.sample(&args)?;

    let calls = denoiser.calls.borrow();
    assert_eq!(calls.len(), 3);

    // the extra pass is a full denoise over the whole schedule
    assert_eq!(calls[1].start_step, 0);
    assert_eq!(calls[1].last_step, 30);
    assert_relative_eq!(calls[1].denoise, 1.0);
    Ok(())
}

#[test]
fn non_empty_latent_with_mask_seeds_phase_b_from_the_input() -> anyhow::Result<()> {
    let denoiser = StubDenoiser::new();
    let sampler = StagedSampler::new(&denoiser);
    let model = StubModel { patched: false };
    let latent = ones_latent(1, 4, 8, 8);
    let mask = Tensor::full(0.0_f32, (8, 8), &Device::Cpu)?;

    let mut args = base_args(&model, &latent);
    args.mask = Some(&mask);
    let result = sampler.sample(&args)?;

    let calls = denoiser.calls.borrow();
    assert_eq!(calls.len(), 2);

    // phase B starts from the provided latent (value 1), not phase A's
    // output (value 2)
    assert_relative_eq!(calls[1].latent_first, 1.0, epsilon = 1e-6);

    // zero mask keeps the original content everywhere
    let first = result.samples.flatten_all()?.to_vec1::<f32>()?[0];
    assert_relative_eq!(first, 1.0, epsilon = 1e-6);
    Ok(())
}

#[test]
fn noise_latent_is_blended_at_noise_strength() -> anyhow::Result<()> {
    let denoiser = StubDenoiser::new();
    let sampler = StagedSampler::new(&denoiser);
    let model = StubModel { patched: false };
    let latent = Latent::zeros(1, 4, 8, 8)?;
    let noise = ones_latent(1, 4, 8, 8);

    let mut args = base_args(&model, &latent);
    args.latent_noise = Some(&noise);
    args.noise_strength = 0.25;
    sampler.sample(&args)?;

    let calls = denoiser.calls.borrow();
    // phase A output is 1 everywhere, noise is 1: 0.75 * 1 + 0.25 * 1
    assert_relative_eq!(calls[1].latent_first, 1.0, epsilon = 1e-6);

    // and with a zero noise latent: 0.75 * 1 + 0.25 * 0
    let denoiser = StubDenoiser::new();
    let sampler = StagedSampler::new(&denoiser);
    let zero_noise = Latent::zeros(1, 4, 8, 8)?;
    let mut args = base_args(&model, &latent);
    args.latent_noise = Some(&zero_noise);
    args.noise_strength = 0.25;
    sampler.sample(&args)?;
    assert_relative_eq!(
        denoiser.calls.borrow()[1].latent_first,
        0.75,
        epsilon = 1e-6
    );
    Ok(())
}

#[test]
fn mismatched_noise_shape_is_reconciled_to_the_seed() -> anyhow::Result<()> {
    let denoiser = StubDenoiser::new();
    let sampler = StagedSampler::new(&denoiser);
    let model = StubModel { patched: false };
    let latent = Latent::zeros(1, 4, 8, 8)?;
    let noise = ones_latent(1, 4, 4, 4);

    let mut args = base_args(&model, &latent);
    args.latent_noise = Some(&noise);
    sampler.sample(&args)?;

    let calls = denoiser.calls.borrow();
    assert_eq!(calls[1].latent_dims, (1, 4, 8, 8));
    Ok(())
}

#[test]
fn guidance_rescale_gate() -> anyhow::Result<()> {
    let model = StubModel { patched: false };
    let latent = Latent::zeros(1, 4, 8, 8)?;

    // cfg_noise = 8.05 rounds to 8.1 -> patched
    let denoiser = StubDenoiser::new();
    let sampler = StagedSampler::new(&denoiser);
    let mut args = base_args(&model, &latent);
    args.cfg_noise = 8.05;
    sampler.sample(&args)?;
    assert!(denoiser.calls.borrow()[1].patched);
    assert!(!denoiser.calls.borrow()[0].patched);

    // cfg_noise = 8.0 -> untouched model
    let denoiser = StubDenoiser::new();
    let sampler = StagedSampler::new(&denoiser);
    let mut args = base_args(&model, &latent);
    args.cfg_noise = 8.0;
    sampler.sample(&args)?;
    assert!(!denoiser.calls.borrow()[1].patched);
    Ok(())
}

#[test]
fn collaborator_errors_carry_phase_context() {
    struct FailingDenoiser;

    impl Denoiser for FailingDenoiser {
        type Model = StubModel;
        type Conditioning = ();

        fn sample(
            &self,
            _model: &StubModel,
            _spec: &SampleSpec<'_>,
            _positive: &(),
            _negative: &(),
            _latent: &Latent,
        ) -> anyhow::Result<Latent> {
            anyhow::bail!("device lost")
        }
    }

    let denoiser = FailingDenoiser;
    let sampler = StagedSampler::new(&denoiser);
    let model = StubModel { patched: false };
    let latent = Latent::zeros(1, 4, 8, 8).unwrap();

    let err = sampler.sample(&base_args(&model, &latent)).unwrap_err();
    let msg = format!("{:#}", err);
    assert!(msg.contains("phase A"), "unexpected error: {}", msg);
    assert!(msg.contains("device lost"), "unexpected error: {}", msg);
}
