//! CLI engine: argument parsing, command handlers, progress output.

pub mod arg_parser;
pub mod handlers;
pub mod progress;

pub use arg_parser::{Cli, Commands, RunArgs};
pub use handlers::{handle_cli, handle_enqueue, handle_run, handle_status};
