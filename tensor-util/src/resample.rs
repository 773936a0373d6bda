use crate::traits::ResampleOps;
use anyhow::Context;
use candle_core::{Device, Tensor};
use rand::Rng;
use rayon::prelude::*;

/// `(N, H, W, C)` to `(N, C, H, W)`
pub fn nhwc_to_nchw(x: &Tensor) -> anyhow::Result<Tensor> {
    Ok(x.permute((0, 3, 1, 2))?.contiguous()?)
}

/// `(N, C, H, W)` to `(N, H, W, C)`
pub fn nchw_to_nhwc(x: &Tensor) -> anyhow::Result<Tensor> {
    Ok(x.permute((0, 2, 3, 1))?.contiguous()?)
}

#[derive(Clone, Copy)]
enum Kernel {
    Bilinear,
    Bicubic,
}

impl ResampleOps for Tensor {
    type Mat = Self;

    fn resize_bilinear(&self, out_h: usize, out_w: usize) -> anyhow::Result<Self> {
        resize_2d(self, out_h, out_w, Kernel::Bilinear)
    }

    fn resize_bicubic(&self, out_h: usize, out_w: usize) -> anyhow::Result<Self> {
        resize_2d(self, out_h, out_w, Kernel::Bicubic)
    }
}

/// Separable resampling of an `(N, C, H, W)` tensor to `(N, C, out_h, out_w)`
/// with align_corners = false pixel-center mapping
fn resize_2d(x_nchw: &Tensor, out_h: usize, out_w: usize, kernel: Kernel) -> anyhow::Result<Tensor> {
    let (nn, cc, hh, ww) = x_nchw
        .dims4()
        .context("resample expects an (N, C, H, W) tensor")?;

    if out_h == 0 || out_w == 0 || hh == 0 || ww == 0 {
        anyhow::bail!(
            "cannot resample ({}, {}) to ({}, {})",
            hh,
            ww,
            out_h,
            out_w
        );
    }

    let src = x_nchw.contiguous()?.flatten_all()?.to_vec1::<f32>()?;
    let scale_h = hh as f32 / out_h as f32;
    let scale_w = ww as f32 / out_w as f32;

    let planes: Vec<Vec<f32>> = (0..(nn * cc))
        .into_par_iter()
        .map(|plane| {
            let base = plane * hh * ww;
            let mut out = vec![0_f32; out_h * out_w];
            for oy in 0..out_h {
                let sy = (oy as f32 + 0.5) * scale_h - 0.5;
                for ox in 0..out_w {
                    let sx = (ox as f32 + 0.5) * scale_w - 0.5;
                    out[oy * out_w + ox] = match kernel {
                        Kernel::Bilinear => sample_bilinear(&src[base..], hh, ww, sy, sx),
                        Kernel::Bicubic => sample_bicubic(&src[base..], hh, ww, sy, sx),
                    };
                }
            }
            out
        })
        .collect();

    let data: Vec<f32> = planes.into_iter().flatten().collect();
    Ok(Tensor::from_vec(data, (nn, cc, out_h, out_w), &Device::Cpu)?)
}

fn at_clamped(plane: &[f32], hh: usize, ww: usize, y: i64, x: i64) -> f32 {
    let y = y.clamp(0, hh as i64 - 1) as usize;
    let x = x.clamp(0, ww as i64 - 1) as usize;
    plane[y * ww + x]
}

fn sample_bilinear(plane: &[f32], hh: usize, ww: usize, sy: f32, sx: f32) -> f32 {
    let y0 = sy.floor() as i64;
    let x0 = sx.floor() as i64;
    let fy = sy - y0 as f32;
    let fx = sx - x0 as f32;

    let v00 = at_clamped(plane, hh, ww, y0, x0);
    let v01 = at_clamped(plane, hh, ww, y0, x0 + 1);
    let v10 = at_clamped(plane, hh, ww, y0 + 1, x0);
    let v11 = at_clamped(plane, hh, ww, y0 + 1, x0 + 1);

    let top = v00 + fx * (v01 - v00);
    let bot = v10 + fx * (v11 - v10);
    top + fy * (bot - top)
}

/// Catmull-Rom cubic weight with a = -0.75 (PyTorch convention)
fn cubic_weight(t: f32) -> f32 {
    let a = -0.75_f32;
    let t = t.abs();
    if t <= 1. {
        ((a + 2.) * t - (a + 3.)) * t * t + 1.
    } else if t < 2. {
        ((a * t - 5. * a) * t + 8. * a) * t - 4. * a
    } else {
        0.
    }
}

fn sample_bicubic(plane: &[f32], hh: usize, ww: usize, sy: f32, sx: f32) -> f32 {
    let y0 = sy.floor() as i64;
    let x0 = sx.floor() as i64;
    let fy = sy - y0 as f32;
    let fx = sx - x0 as f32;

    let wy: Vec<f32> = (-1..3).map(|k| cubic_weight(fy - k as f32)).collect();
    let wx: Vec<f32> = (-1..3).map(|k| cubic_weight(fx - k as f32)).collect();

    let mut acc = 0_f32;
    for (ky, wy_k) in (-1..3).zip(wy.iter()) {
        let mut row = 0_f32;
        for (kx, wx_k) in (-1..3).zip(wx.iter()) {
            row += wx_k * at_clamped(plane, hh, ww, y0 + ky, x0 + kx);
        }
        acc += wy_k * row;
    }
    acc
}

/// Center-crop `(N, C, H, W)` to the aspect ratio of `(out_h, out_w)`,
/// then bicubic-resize to exactly `(out_h, out_w)`
pub fn common_upscale(x_nchw: &Tensor, out_h: usize, out_w: usize) -> anyhow::Result<Tensor> {
    let (_, _, hh, ww) = x_nchw
        .dims4()
        .context("common_upscale expects an (N, C, H, W) tensor")?;

    let src_ratio = ww as f64 / hh as f64;
    let dst_ratio = out_w as f64 / out_h as f64;

    let cropped = if (src_ratio - dst_ratio).abs() > 1e-9 {
        if src_ratio > dst_ratio {
            let keep_w = ((hh as f64 * dst_ratio).round() as usize).clamp(1, ww);
            x_nchw.narrow(3, (ww - keep_w) / 2, keep_w)?
        } else {
            let keep_h = ((ww as f64 / dst_ratio).round() as usize).clamp(1, hh);
            x_nchw.narrow(2, (hh - keep_h) / 2, keep_h)?
        }
    } else {
        x_nchw.clone()
    };

    cropped.contiguous()?.resize_bicubic(out_h, out_w)
}

/// Random-resized crop: cut a random rectangle (area fraction in
/// `[0.08, 1.0]`, aspect ratio in `[3/4, 4/3]`, 10 attempts with a
/// center-crop fallback) and bilinear-resize it to `(out_h, out_w)`
pub fn random_resized_crop<R: Rng>(
    x_nchw: &Tensor,
    out_h: usize,
    out_w: usize,
    rng: &mut R,
) -> anyhow::Result<Tensor> {
    let (_, _, hh, ww) = x_nchw
        .dims4()
        .context("random_resized_crop expects an (N, C, H, W) tensor")?;

    if out_h == 0 || out_w == 0 {
        anyhow::bail!("cannot crop-resize to ({}, {})", out_h, out_w);
    }

    let (top, left, ch, cw) = crop_params(hh, ww, rng);
    let crop = x_nchw.narrow(2, top, ch)?.narrow(3, left, cw)?;
    crop.contiguous()?.resize_bilinear(out_h, out_w)
}

fn crop_params<R: Rng>(hh: usize, ww: usize, rng: &mut R) -> (usize, usize, usize, usize) {
    let area = (hh * ww) as f64;
    let log_ratio = (0.75_f64.ln(), (4_f64 / 3_f64).ln());

    for _ in 0..10 {
        let target_area = area * rng.random_range(0.08..=1.0);
        let ratio = rng.random_range(log_ratio.0..=log_ratio.1).exp();

        let cw = (target_area * ratio).sqrt().round() as usize;
        let ch = (target_area / ratio).sqrt().round() as usize;

        if cw > 0 && ch > 0 && cw <= ww && ch <= hh {
            let top = rng.random_range(0..=(hh - ch));
            let left = rng.random_range(0..=(ww - cw));
            return (top, left, ch, cw);
        }
    }

    // fallback: largest center crop at a valid aspect ratio
    let in_ratio = ww as f64 / hh as f64;
    let (ch, cw) = if in_ratio < 0.75 {
        let cw = ww;
        (((cw as f64) / 0.75).round() as usize, cw)
    } else if in_ratio > 4. / 3. {
        let ch = hh;
        (ch, ((ch as f64) * 4. / 3.).round() as usize)
    } else {
        (hh, ww)
    };
    let ch = ch.min(hh);
    let cw = cw.min(ww);
    ((hh - ch) / 2, (ww - cw) / 2, ch, cw)
}
