//! Data structures shared by the runtime, the watcher and the reconciler.
//!
//! Nothing here is persisted on its own: the hosts file is the only durable
//! state, and every [`HostRecord`] can be rebuilt from the runtime.

/// One resolvable name owned by a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub address: String,
    pub alias: String,
    pub container_id: String,
}

/// A container's attachment to the tracked network, as reported by the
/// runtime at inspection time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attachment {
    pub address: String,
    pub aliases: Vec<String>,
}

/// A network change observed on the event stream.
///
/// Only the container id is carried; the attachment details are looked up
/// when the event is handled so that the file reflects the latest state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// A container was connected to the tracked network.
    Attach { container_id: String },
    /// A container was disconnected from the tracked network.
    Detach { container_id: String },
}
