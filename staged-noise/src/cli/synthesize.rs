use crate::noise_from_image::NoiseFromImage;
use anyhow::Result;
use clap::Args;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tensor_util::blend::BlendMode;
use tensor_util::candle_core::Tensor;
use tensor_util::traits::{SampleOps, ScalarStatOps};

#[derive(Args, Debug)]
pub struct SynthesizeArgs {
    /// image batch size
    #[arg(long, default_value_t = 1)]
    batch: usize,

    /// image height
    #[arg(long, default_value_t = 512)]
    height: usize,

    /// image width
    #[arg(long, default_value_t = 512)]
    width: usize,

    /// elastic warp displacement magnitude
    #[arg(long, default_value_t = 210.0)]
    magnitude: f32,

    /// elastic warp displacement smoothness
    #[arg(long, default_value_t = 3.0)]
    smoothness: f32,

    /// multiplier on the raw Gaussian noise
    #[arg(long, default_value_t = 1.0)]
    noise_intensity: f32,

    /// crop-and-rescale divisor for coarse noise (0 = raw noise)
    #[arg(long, default_value_t = 2)]
    noise_resize_factor: usize,

    /// blend rate between warped image and noise
    #[arg(long, default_value_t = 0.0)]
    noise_blend_rate: f64,

    /// saturation factor (1.0 = no-op)
    #[arg(long, default_value_t = 1.0)]
    saturation_correction: f64,

    /// batch folding blend mode (off, multiply, add, overlay,
    /// soft-light, hard-light, lighten, darken)
    #[arg(long, default_value = "off")]
    blend_mode: String,

    /// batch folding strength
    #[arg(long, default_value_t = 0.25)]
    blend_rate: f64,

    /// random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

pub fn run(args: &SynthesizeArgs) -> Result<()> {
    let blend_mode: BlendMode = args.blend_mode.parse()?;

    let synth = NoiseFromImage {
        magnitude: args.magnitude,
        smoothness: args.smoothness,
        noise_intensity: args.noise_intensity,
        noise_resize_factor: args.noise_resize_factor,
        noise_blend_rate: args.noise_blend_rate,
        saturation_correction: args.saturation_correction,
        blend_mode,
        blend_rate: args.blend_rate,
    };

    let mut rng = StdRng::seed_from_u64(args.seed);

    info!(
        "synthesizing from a random {} x {} x {} batch",
        args.batch, args.height, args.width
    );

    let images = Tensor::runif(&[args.batch, args.height, args.width, 3], 0., 1., &mut rng)?;
    let field = synth.synthesize(&images, &mut rng, None)?;

    let mean = field.image.mean_scalar()?;
    let max = field.image.max_scalar()?;
    let min = field.image.min_scalar()?;

    info!(
        "noise field {:?}: mean {:.4}, min {:.4}, max {:.4}",
        field.image.dims(),
        mean,
        min,
        max
    );

    Ok(())
}
