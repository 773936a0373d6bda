use approx::assert_relative_eq;
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tensor_util::colorspace::{adjust_saturation, channel_means};
use tensor_util::warp::elastic_warp;

fn rgb_image(n: usize, h: usize, w: usize) -> Tensor {
    let data: Vec<f32> = (0..(n * 3 * h * w))
        .map(|i| (i % 13) as f32 / 13.)
        .collect();
    Tensor::from_vec(data, (n, 3, h, w), &Device::Cpu).expect("image tensor")
}

#[test]
fn zero_magnitude_warp_is_identity() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(3);
    let x = rgb_image(2, 8, 8);

    let warped = elastic_warp(&x, 0., 3., &[0.1, 0.2, 0.3], &mut rng)?;

    let a = x.flatten_all()?.to_vec1::<f32>()?;
    let b = warped.flatten_all()?.to_vec1::<f32>()?;
    for (x, y) in a.iter().zip(b.iter()) {
        assert_relative_eq!(*x, *y, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn warp_preserves_shape() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(5);
    let x = rgb_image(1, 12, 10);

    let warped = elastic_warp(&x, 50., 2., &[0., 0., 0.], &mut rng)?;
    assert_eq!(warped.dims4()?, (1, 3, 12, 10));
    Ok(())
}

#[test]
fn warp_rejects_fill_channel_mismatch() {
    let mut rng = StdRng::seed_from_u64(5);
    let x = rgb_image(1, 4, 4);
    assert!(elastic_warp(&x, 10., 1., &[0.5], &mut rng).is_err());
}

#[test]
fn large_warp_of_constant_image_stays_constant() -> anyhow::Result<()> {
    // fill equals the image value, so displacement cannot change anything
    let mut rng = StdRng::seed_from_u64(9);
    let x = Tensor::full(0.5_f32, (1, 3, 8, 8), &Device::Cpu)?;

    let warped = elastic_warp(&x, 200., 3., &[0.5, 0.5, 0.5], &mut rng)?;
    for v in warped.flatten_all()?.to_vec1::<f32>()? {
        assert_relative_eq!(v, 0.5, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn saturation_factor_one_is_identity() -> anyhow::Result<()> {
    let x = rgb_image(1, 4, 4);
    let y = adjust_saturation(&x, 1.0)?;

    let a = x.flatten_all()?.to_vec1::<f32>()?;
    let b = y.flatten_all()?.to_vec1::<f32>()?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn saturation_factor_zero_is_grayscale() -> anyhow::Result<()> {
    // pure red pixel collapses to its rec601 luma
    let x = Tensor::from_vec(vec![1.0_f32, 0., 0.], (1, 3, 1, 1), &Device::Cpu)?;
    let y = adjust_saturation(&x, 0.0)?;

    for v in y.flatten_all()?.to_vec1::<f32>()? {
        assert_relative_eq!(v, 0.299, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn channel_means_per_channel() -> anyhow::Result<()> {
    let data = vec![
        0.0_f32, 1., // channel 0
        0.5, 0.5, // channel 1
        1., 1., // channel 2
    ];
    let x = Tensor::from_vec(data, (1, 3, 1, 2), &Device::Cpu)?;

    let means = channel_means(&x)?;
    assert_relative_eq!(means[0], 0.5, epsilon = 1e-6);
    assert_relative_eq!(means[1], 0.5, epsilon = 1e-6);
    assert_relative_eq!(means[2], 1.0, epsilon = 1e-6);
    Ok(())
}
