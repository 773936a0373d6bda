use approx::assert_relative_eq;
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tensor_util::sampling::rnorm_like;
use tensor_util::traits::{SampleOps, ScalarStatOps};

#[test]
fn same_seed_same_draws() -> anyhow::Result<()> {
    let mut rng_a = StdRng::seed_from_u64(17);
    let mut rng_b = StdRng::seed_from_u64(17);

    let a = Tensor::rnorm(&[2, 3, 4], &mut rng_a)?;
    let b = Tensor::rnorm(&[2, 3, 4], &mut rng_b)?;

    assert_eq!(
        a.flatten_all()?.to_vec1::<f32>()?,
        b.flatten_all()?.to_vec1::<f32>()?
    );
    Ok(())
}

#[test]
fn zero_intensity_noise_is_zero() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(17);
    let x = Tensor::zeros((1, 4, 4, 3), candle_core::DType::F32, &Device::Cpu)?;

    let noise = rnorm_like(&x, 0., &mut rng)?;
    for v in noise.flatten_all()?.to_vec1::<f32>()? {
        assert_eq!(v, 0.);
    }
    Ok(())
}

#[test]
fn scalar_stats_over_a_known_tensor() -> anyhow::Result<()> {
    let x = Tensor::from_vec(vec![-2.0_f32, 0., 1., 5.], (2, 2), &Device::Cpu)?;

    assert_relative_eq!(x.min_scalar()?, -2.0, epsilon = 1e-6);
    assert_relative_eq!(x.max_scalar()?, 5.0, epsilon = 1e-6);
    assert_relative_eq!(x.mean_scalar()?, 1.0, epsilon = 1e-6);
    Ok(())
}

#[test]
fn uniform_draws_stay_in_range() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(23);
    let x = Tensor::runif(&[64], -1., 1., &mut rng)?;

    for v in x.flatten_all()?.to_vec1::<f32>()? {
        assert!((-1. ..1.).contains(&v));
    }
    Ok(())
}
