pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod image;
pub mod local;
pub mod logging;
pub mod server;
pub mod version;
