pub mod cli;
pub mod config;
pub mod ernie;
pub mod error;
pub mod logging;
pub mod model;
pub mod storage;

pub use config::Config;
pub use error::{ModelError, ModelResult};
