pub mod blend;
pub mod colorspace;
pub mod composite;
pub mod resample;
pub mod sampling;
pub mod traits;
pub mod warp;

pub use candle_core;
