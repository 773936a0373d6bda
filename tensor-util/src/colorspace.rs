use anyhow::Context;
use candle_core::Tensor;

/// Saturation adjustment of an `(N, C, H, W)` RGB tensor
///
/// out = gray + factor * (img - gray), clamped to [0, 1],
/// with gray the rec601 luma (0.299 R + 0.587 G + 0.114 B).
/// factor = 1 is exactly the identity.
pub fn adjust_saturation(x_nchw: &Tensor, factor: f64) -> anyhow::Result<Tensor> {
    if factor == 1.0 {
        return Ok(x_nchw.clone());
    }

    let (_, cc, _, _) = x_nchw
        .dims4()
        .context("adjust_saturation expects an (N, C, H, W) tensor")?;
    if cc < 3 {
        anyhow::bail!("saturation adjustment needs 3 channels, found {}", cc);
    }

    let r = x_nchw.narrow(1, 0, 1)?;
    let g = x_nchw.narrow(1, 1, 1)?;
    let b = x_nchw.narrow(1, 2, 1)?;

    let gray = (r.affine(0.299, 0.)? + g.affine(0.587, 0.)?)?.add(&b.affine(0.114, 0.)?)?;

    let shifted = x_nchw
        .narrow(1, 0, 3)?
        .broadcast_sub(&gray)?
        .affine(factor, 0.)?
        .broadcast_add(&gray)?
        .clamp(0_f32, 1_f32)?;

    Ok(shifted)
}

/// Per-channel mean of an `(N, C, H, W)` tensor across the whole batch
pub fn channel_means(x_nchw: &Tensor) -> anyhow::Result<Vec<f32>> {
    let (_, cc, _, _) = x_nchw
        .dims4()
        .context("channel_means expects an (N, C, H, W) tensor")?;

    let mut means = Vec::with_capacity(cc);
    for c in 0..cc {
        let mean = x_nchw
            .narrow(1, c, 1)?
            .contiguous()?
            .flatten_all()?
            .mean(0)?
            .to_scalar::<f32>()?;
        means.push(mean);
    }
    Ok(means)
}
