use candle_core::{Device, Tensor};

/// A codec-specific latent with explicit provenance
///
/// `empty` records whether the latent was created without content
/// (e.g. a fresh zero latent from an empty-latent node) as opposed to
/// holding an encoded image. The sampler branches on this flag instead
/// of rescanning tensor values.
#[derive(Debug, Clone)]
pub struct Latent {
    pub samples: Tensor,
    pub empty: bool,
}

impl Latent {
    /// a fresh zero latent of shape `(batch, channels, h, w)`
    pub fn zeros(batch: usize, channels: usize, h: usize, w: usize) -> anyhow::Result<Self> {
        let samples = Tensor::zeros(
            (batch, channels, h, w),
            candle_core::DType::F32,
            &Device::Cpu,
        )?;
        Ok(Self {
            samples,
            empty: true,
        })
    }

    /// Wrap an existing tensor, deriving `empty` from a one-time
    /// all-zero scan.
    ///
    /// Caveat: a legitimately all-zero latent that *does* carry content
    /// is misclassified as empty here; callers that know the provenance
    /// should use [`Latent::non_empty`] instead.
    pub fn from_samples(samples: Tensor) -> anyhow::Result<Self> {
        let max_abs = samples
            .abs()?
            .flatten_all()?
            .max(0)?
            .to_scalar::<f32>()?;
        Ok(Self {
            empty: max_abs == 0.,
            samples,
        })
    }

    /// Wrap an existing tensor known to carry content
    pub fn non_empty(samples: Tensor) -> Self {
        Self {
            samples,
            empty: false,
        }
    }

    pub fn clone_samples(&self) -> Tensor {
        self.samples.clone()
    }

    /// `(batch, channels, height, width)`
    pub fn dims(&self) -> anyhow::Result<(usize, usize, usize, usize)> {
        Ok(self.samples.dims4()?)
    }
}
