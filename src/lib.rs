// src/lib.rs
pub mod config;
pub mod utils;
pub mod pipelines;
pub mod cli;
pub use cli::{Arguments, PacbioModel};
pub use config::defs::PipelineError;
pub use utils::external_tools::{ExternalTool, TokenizeError, tokenize};
