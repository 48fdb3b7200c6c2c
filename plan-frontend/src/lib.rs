pub mod cli;
pub mod converter;
pub mod errors;
pub mod loader;

pub use cli::{RunRequest, RunSummary, run};
pub use errors::FrontendError;
