// src/lib.rs
pub mod aggregate;
pub mod classify;
pub mod completion;
pub mod config;
pub mod driver;
pub mod error;
pub mod export;
pub mod loader;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod weekend;


pub use classify::Category;
pub use config::PipelineConfig;
pub use error::{PipelineError, RunWarning};
pub use report::{JsonArtifactRenderer, ReportRenderer};
