use crate::types::{Attachment, NetworkEvent};
use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub mod docker;
pub use docker::DockerRuntime;

#[async_trait]
pub trait ContainerRuntime {
    /// Ids of all running containers.
    async fn list_running(&self) -> Result<Vec<String>>;

    /// The container's attachment to the tracked network, or `None` if it is
    /// not attached to it.
    async fn inspect(&self, container_id: &str) -> Result<Option<Attachment>>;

    /// Attach/detach events for the tracked network. An `Err` item means the
    /// subscription itself failed.
    fn events(&self) -> BoxStream<'_, Result<NetworkEvent>>;
}
