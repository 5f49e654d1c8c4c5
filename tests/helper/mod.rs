//! Shared test utilities
#![allow(dead_code, unused_imports)]

mod registry;
mod server;

pub use registry::*;
pub use server::*;
