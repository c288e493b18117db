pub mod account_manager;
pub mod config;
pub mod db;
pub mod models;
pub mod orchestrator;
pub mod paths;
pub mod platforms;
pub mod sweeper;
pub mod templates;
pub mod token_manager;
pub mod utils;

pub use config::AppConfig;
pub use utils::error::{AppError, Result};
