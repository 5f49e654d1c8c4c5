//! Registry implementations for listing container image tags

pub mod docker;

pub use docker::DockerRegistry;
