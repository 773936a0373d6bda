use candle_core::Tensor;
use rand::Rng;

/// Operations to sample random tensors through a caller-supplied
/// random source, so callers decide reproducibility
pub trait SampleOps {
    type Mat;
    type Scalar;

    /// standard Gaussian draws, elementwise
    fn rnorm<R: Rng>(shape: &[usize], rng: &mut R) -> anyhow::Result<Self::Mat>;

    /// uniform draws on `[lo, hi)`, elementwise
    fn runif<R: Rng>(
        shape: &[usize],
        lo: Self::Scalar,
        hi: Self::Scalar,
        rng: &mut R,
    ) -> anyhow::Result<Self::Mat>;
}

/// Spatial resampling of `(batch, channel, height, width)` tensors
pub trait ResampleOps {
    type Mat;

    fn resize_bilinear(&self, out_h: usize, out_w: usize) -> anyhow::Result<Self::Mat>;

    fn resize_bicubic(&self, out_h: usize, out_w: usize) -> anyhow::Result<Self::Mat>;
}

/// Reading off scalar summaries from a `Tensor`
pub trait ScalarStatOps {
    type Scalar;

    fn max_scalar(&self) -> anyhow::Result<Self::Scalar>;
    fn min_scalar(&self) -> anyhow::Result<Self::Scalar>;
    fn mean_scalar(&self) -> anyhow::Result<Self::Scalar>;
}

impl ScalarStatOps for Tensor {
    type Scalar = f32;

    fn max_scalar(&self) -> anyhow::Result<f32> {
        Ok(self.flatten_all()?.max(0)?.to_scalar::<f32>()?)
    }

    fn min_scalar(&self) -> anyhow::Result<f32> {
        Ok(self.flatten_all()?.min(0)?.to_scalar::<f32>()?)
    }

    fn mean_scalar(&self) -> anyhow::Result<f32> {
        Ok(self.flatten_all()?.mean(0)?.to_scalar::<f32>()?)
    }
}
