use crate::traits::ResampleOps;
use anyhow::Context;
use candle_core::{Device, Tensor};

/// Alpha-composite `source` over `destination` through `mask`
///
/// Both latents are `(N, C, H, W)`. The mask may be `(H, W)` or
/// `(N, H, W)` and is bilinearly resampled to the source's spatial
/// dims, then feathered by a linear ramp over `feather` cells at each
/// edge of the paste rectangle. The source is pasted at offset
/// `(x, y)`, cropped to what fits inside the destination.
///
/// out = m * src + (1 - m) * dst, elementwise inside the overlap
///
pub fn composite(
    destination: &Tensor,
    source: &Tensor,
    x: usize,
    y: usize,
    mask: &Tensor,
    feather: usize,
) -> anyhow::Result<Tensor> {
    let (nn, cc, dh, dw) = destination
        .dims4()
        .context("composite destination must be (N, C, H, W)")?;
    let (sn, sc, sh, sw) = source
        .dims4()
        .context("composite source must be (N, C, H, W)")?;

    if sn != nn || sc != cc {
        anyhow::bail!(
            "composite batch/channel mismatch: destination ({}, {}), source ({}, {})",
            nn,
            cc,
            sn,
            sc
        );
    }

    if x >= dw || y >= dh {
        anyhow::bail!(
            "paste offset ({}, {}) is outside a ({}, {}) destination",
            x,
            y,
            dh,
            dw
        );
    }

    let ph = sh.min(dh - y);
    let pw = sw.min(dw - x);
    if ph == 0 || pw == 0 {
        anyhow::bail!("composite overlap is empty");
    }

    let m = resample_mask(mask, nn, sh, sw)?;
    let m = m.flatten_all()?.to_vec1::<f32>()?;

    let dst = destination.contiguous()?.flatten_all()?.to_vec1::<f32>()?;
    let src = source.contiguous()?.flatten_all()?.to_vec1::<f32>()?;

    let mut out = dst;
    for b in 0..nn {
        for c in 0..cc {
            for py in 0..ph {
                for px in 0..pw {
                    let alpha = m[(b * sh + py) * sw + px] * edge_ramp(py, px, ph, pw, feather);
                    let d_idx = ((b * cc + c) * dh + y + py) * dw + x + px;
                    let s_idx = ((b * cc + c) * sh + py) * sw + px;
                    out[d_idx] = alpha * src[s_idx] + (1. - alpha) * out[d_idx];
                }
            }
        }
    }

    Ok(Tensor::from_vec(out, (nn, cc, dh, dw), &Device::Cpu)?)
}

/// linear falloff to zero over `feather` cells from each paste edge
fn edge_ramp(py: usize, px: usize, ph: usize, pw: usize, feather: usize) -> f32 {
    if feather == 0 {
        return 1.;
    }
    let f = (feather + 1) as f32;
    let dist = py.min(ph - 1 - py).min(px).min(pw - 1 - px);
    (((dist + 1) as f32) / f).min(1.)
}

fn resample_mask(mask: &Tensor, nn: usize, sh: usize, sw: usize) -> anyhow::Result<Tensor> {
    let m_n1hw = match mask.dims() {
        [h, w] => mask
            .reshape((1, 1, *h, *w))?
            .broadcast_as((nn, 1, *h, *w))?
            .contiguous()?,
        [n, h, w] => {
            if *n != nn {
                anyhow::bail!("mask batch {} does not match latent batch {}", n, nn);
            }
            mask.reshape((*n, 1, *h, *w))?
        }
        other => anyhow::bail!("mask must be (H, W) or (N, H, W), found {:?}", other),
    };

    let (_, _, mh, mw) = m_n1hw.dims4()?;
    let m = if (mh, mw) != (sh, sw) {
        m_n1hw.resize_bilinear(sh, sw)?
    } else {
        m_n1hw
    };

    Ok(m.clamp(0_f32, 1_f32)?)
}
