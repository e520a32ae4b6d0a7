pub mod config;
pub mod config_file;
pub mod env;
pub mod logger;

pub use config::*;
pub use config_file::{ImgflowToml, apply_file_to_config, load_config_file};
pub use env::db_path_from_env;
pub use logger::setup_logging;
