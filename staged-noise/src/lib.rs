pub mod cli;
pub mod latent;
pub mod noise_from_image;
pub mod rescale_cfg;
pub mod staged_sampler;
pub mod traits;

pub use candle_core;
pub use tensor_util;
