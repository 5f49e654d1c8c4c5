//! Registry trait for listing the tags of a container repository

#[cfg(test)]
use mockall::automock;

use crate::image::Image;
use crate::version::error::RegistryError;

/// Trait for fetching tags from a container registry
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Fetches every tag published for the image's repository
    ///
    /// # Arguments
    /// * `image` - The image whose `domain` and `path` identify the repository
    ///
    /// # Returns
    /// * `Ok(Vec<String>)` - Raw tag strings, sorted ascending
    /// * `Err(RegistryError)` - If the registry cannot be reached or refuses the request
    async fn fetch_tags(&self, image: &Image) -> Result<Vec<String>, RegistryError>;
}
