use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod common;
pub mod config;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod relation;
pub mod stages;
pub mod writer;

pub use config::PipelineConfig;
pub use error::{EtlError, Result};
pub use pipeline::{Pipeline, RunReport};
