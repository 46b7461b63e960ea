//! Seam to the pages (client windows) the worker controls.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait Clients: Send + Sync {
    /// Take control of every open page without waiting for a reload.
    async fn claim(&self) -> Result<()>;

    /// Focus a page at `url`, opening one if needed.
    async fn open_window(&self, url: &str) -> Result<()>;
}
