pub mod config;
pub mod error;
pub mod sample;

pub use config::{EngineConfig, OutputConfig, SamplingConfig};
pub use error::*;
pub use sample::*;
