pub mod cache;
pub mod cli;
pub mod config;
pub mod generator;
pub mod i18n;
pub mod llm;
pub mod records;
pub mod storage;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use generator::context::PaperContext;
pub use generator::error::PaperError;
pub use generator::workflow::{PaperArtifacts, PaperRequest, generate_paper, launch};
