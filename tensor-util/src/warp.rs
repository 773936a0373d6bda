use anyhow::Context;
use candle_core::{Device, Tensor};
use rand::Rng;
use rayon::prelude::*;

/// Random elastic displacement warp of an `(N, C, H, W)` image tensor
///
/// A uniform `[-1, 1]` displacement field per axis is smoothed with a
/// separable Gaussian of width `smoothness`, scaled by
/// `magnitude / (W or H)` in normalized grid units, and applied by
/// bilinear sampling. Samples falling outside the source take
/// `fill[c]` for channel `c`. One displacement field is drawn per call
/// and shared across the batch.
///
/// * `magnitude` - displacement strength, >= 0
/// * `smoothness` - Gaussian sigma of the field, >= 0 (0 = no smoothing)
/// * `fill` - per-channel border fill values, length C
///
pub fn elastic_warp<R: Rng>(
    x_nchw: &Tensor,
    magnitude: f32,
    smoothness: f32,
    fill: &[f32],
    rng: &mut R,
) -> anyhow::Result<Tensor> {
    let (nn, cc, hh, ww) = x_nchw
        .dims4()
        .context("elastic_warp expects an (N, C, H, W) tensor")?;

    if fill.len() != cc {
        anyhow::bail!("fill has {} channels, image has {}", fill.len(), cc);
    }
    if hh == 0 || ww == 0 {
        anyhow::bail!("cannot warp a ({}, {}) image", hh, ww);
    }

    let mut dx = uniform_field(hh * ww, rng);
    let mut dy = uniform_field(hh * ww, rng);

    if smoothness > 0. {
        let kernel = gaussian_kernel(smoothness);
        dx = smooth_separable(&dx, hh, ww, &kernel);
        dy = smooth_separable(&dy, hh, ww, &kernel);
    }

    // displacements in pixel units
    let ax = magnitude / ww as f32;
    let ay = magnitude / hh as f32;
    for v in dx.iter_mut() {
        *v *= ax;
    }
    for v in dy.iter_mut() {
        *v *= ay;
    }

    let src = x_nchw.contiguous()?.flatten_all()?.to_vec1::<f32>()?;

    let planes: Vec<Vec<f32>> = (0..(nn * cc))
        .into_par_iter()
        .map(|plane| {
            let chan = plane % cc;
            let base = plane * hh * ww;
            let fill_c = fill[chan];
            let mut out = vec![0_f32; hh * ww];
            for y in 0..hh {
                for x in 0..ww {
                    let idx = y * ww + x;
                    let sy = y as f32 + dy[idx];
                    let sx = x as f32 + dx[idx];
                    out[idx] = sample_with_fill(&src[base..base + hh * ww], hh, ww, sy, sx, fill_c);
                }
            }
            out
        })
        .collect();

    let data: Vec<f32> = planes.into_iter().flatten().collect();
    Ok(Tensor::from_vec(data, (nn, cc, hh, ww), &Device::Cpu)?)
}

fn uniform_field<R: Rng>(nelem: usize, rng: &mut R) -> Vec<f32> {
    (0..nelem).map(|_| rng.random_range(-1.0..1.0)).collect()
}

/// normalized 1d Gaussian, half-width 4 sigma
fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (4. * sigma).ceil() as i64;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|k| (-((k * k) as f32) / (2. * sigma * sigma)).exp())
        .collect();
    let total: f32 = kernel.iter().sum();
    for w in kernel.iter_mut() {
        *w /= total;
    }
    kernel
}

/// separable convolution with edge replication
fn smooth_separable(field: &[f32], hh: usize, ww: usize, kernel: &[f32]) -> Vec<f32> {
    let radius = (kernel.len() / 2) as i64;

    let mut horiz = vec![0_f32; hh * ww];
    for y in 0..hh {
        for x in 0..ww {
            let mut acc = 0_f32;
            for (k, w) in kernel.iter().enumerate() {
                let sx = (x as i64 + k as i64 - radius).clamp(0, ww as i64 - 1) as usize;
                acc += w * field[y * ww + sx];
            }
            horiz[y * ww + x] = acc;
        }
    }

    let mut out = vec![0_f32; hh * ww];
    for y in 0..hh {
        for x in 0..ww {
            let mut acc = 0_f32;
            for (k, w) in kernel.iter().enumerate() {
                let sy = (y as i64 + k as i64 - radius).clamp(0, hh as i64 - 1) as usize;
                acc += w * horiz[sy * ww + x];
            }
            out[y * ww + x] = acc;
        }
    }
    out
}

/// bilinear sample where any out-of-bounds corner contributes `fill`
fn sample_with_fill(plane: &[f32], hh: usize, ww: usize, sy: f32, sx: f32, fill: f32) -> f32 {
    let y0 = sy.floor() as i64;
    let x0 = sx.floor() as i64;
    let fy = sy - y0 as f32;
    let fx = sx - x0 as f32;

    let at = |y: i64, x: i64| -> f32 {
        if y < 0 || x < 0 || y >= hh as i64 || x >= ww as i64 {
            fill
        } else {
            plane[y as usize * ww + x as usize]
        }
    };

    let v00 = at(y0, x0);
    let v01 = at(y0, x0 + 1);
    let v10 = at(y0 + 1, x0);
    let v11 = at(y0 + 1, x0 + 1);

    let top = v00 + fx * (v01 - v00);
    let bot = v10 + fx * (v11 - v10);
    top + fy * (bot - top)
}
