use candle_core::{Result, Tensor};
use std::str::FromStr;

/// Pixel blend modes for folding a batch of images into one
///
/// `Off` disables folding altogether; every other mode is a closed-form
/// formula combining a base image `A` with an overlay `B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Off,
    Multiply,
    Add,
    Overlay,
    SoftLight,
    HardLight,
    Lighten,
    Darken,
}

impl FromStr for BlendMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "multiply" => Ok(Self::Multiply),
            "add" => Ok(Self::Add),
            "overlay" => Ok(Self::Overlay),
            "soft light" | "soft-light" | "soft_light" => Ok(Self::SoftLight),
            "hard light" | "hard-light" | "hard_light" => Ok(Self::HardLight),
            "lighten" => Ok(Self::Lighten),
            "darken" => Ok(Self::Darken),
            _ => anyhow::bail!("unsupported blend mode: {}", s),
        }
    }
}

/// Blend overlay `b` onto base `a` at strength `rate`
///
/// out = (1 - rate) * A + rate * blend(A, B)
///
/// * `a` - base image tensor
/// * `b` - overlay image tensor, same shape as `a`
/// * `mode` - blend formula; must not be `Off`
/// * `rate` - blend strength in `[0, 1]`
///
pub fn blend_images(a: &Tensor, b: &Tensor, mode: BlendMode, rate: f64) -> anyhow::Result<Tensor> {
    let blended = match mode {
        BlendMode::Off => anyhow::bail!("blend mode 'off' is not a pairwise formula"),
        BlendMode::Multiply => a.mul(b)?,
        BlendMode::Add => a.add(b)?,
        BlendMode::Overlay => overlay_blend(a, b)?,
        BlendMode::SoftLight => soft_light_blend(a, b)?,
        BlendMode::HardLight => hard_light_blend(a, b)?,
        BlendMode::Lighten => a.maximum(b)?,
        BlendMode::Darken => a.minimum(b)?,
    };

    Ok((a.affine(1. - rate, 0.)? + blended.affine(rate, 0.)?)?)
}

/// where A < 0.5: 2AB, else 1 - 2(1-A)(1-B)
fn overlay_blend(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let dark = a.mul(b)?.affine(2., 0.)?;
    let light = a
        .affine(-1., 1.)?
        .mul(&b.affine(-1., 1.)?)?
        .affine(-2., 1.)?;
    a.lt(0.5_f64)?.where_cond(&dark, &light)
}

/// 2AB + A^2 (1 - 2B)
fn soft_light_blend(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let term1 = a.mul(b)?.affine(2., 0.)?;
    let term2 = a.powf(2.)?.mul(&b.affine(-2., 1.)?)?;
    term1.add(&term2)
}

/// 2AB + (1 - 2A)(1 - B)
fn hard_light_blend(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let term1 = a.mul(b)?.affine(2., 0.)?;
    let term2 = a.affine(-2., 1.)?.mul(&b.affine(-1., 1.)?)?;
    term1.add(&term2)
}
