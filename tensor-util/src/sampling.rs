use crate::traits::SampleOps;
use candle_core::{Device, Tensor};
use rand::distr::Uniform;
use rand::Rng;
use rand_distr::{Distribution, Normal};

impl SampleOps for Tensor {
    type Mat = Self;
    type Scalar = f32;

    fn rnorm<R: Rng>(shape: &[usize], rng: &mut R) -> anyhow::Result<Self::Mat> {
        let pdf = Normal::new(0_f32, 1_f32)?;
        let nelem = shape.iter().product::<usize>();
        let data_vec: Vec<f32> = (0..nelem).map(|_| pdf.sample(rng)).collect();
        Ok(Tensor::from_vec(data_vec, shape, &Device::Cpu)?)
    }

    fn runif<R: Rng>(shape: &[usize], lo: f32, hi: f32, rng: &mut R) -> anyhow::Result<Self::Mat> {
        let pdf = Uniform::new(lo, hi)?;
        let nelem = shape.iter().product::<usize>();
        let data_vec: Vec<f32> = (0..nelem).map(|_| pdf.sample(rng)).collect();
        Ok(Tensor::from_vec(data_vec, shape, &Device::Cpu)?)
    }
}

/// Gaussian noise with the same shape as `x`, scaled by `intensity`
pub fn rnorm_like<R: Rng>(x: &Tensor, intensity: f32, rng: &mut R) -> anyhow::Result<Tensor> {
    let noise = Tensor::rnorm(x.dims(), rng)?;
    Ok(noise.affine(intensity as f64, 0.)?)
}
