#![forbid(unsafe_code)]

pub mod cli;
pub mod db;
pub mod endpoint;
pub mod models;
pub mod resultspec;
pub mod store;
pub mod utils;

pub use cli::app::{Cli, Command};
