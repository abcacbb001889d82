pub mod cli;
pub mod github;
pub mod http;
pub mod load_config;
pub mod slack;
pub mod wordpress;

pub use cli::{run, Cli, Commands};
