//! IRC bot that recognizes mentions of Bitbucket pull requests in channel chat and replies with a
//! short summary of each one.

mod bot;
pub mod command;
pub mod config;
pub mod consts;
mod context;
pub mod dedup;
mod error;
pub mod http;
pub mod plugin;
pub mod telemetry;

pub use bot::Bot;
pub use config::Config;
pub use context::Context;
pub use error::Error;
pub use plugin::{Plugin, Registry};
