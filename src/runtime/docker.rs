use super::ContainerRuntime;
use crate::types::{Attachment, NetworkEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::models::{ContainerInspectResponse, EventMessage, EventMessageTypeEnum};
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::future;
use futures_util::stream::{BoxStream, StreamExt};
use log::{debug, info};
use std::collections::HashMap;

/// Request timeout for explicitly configured endpoints.
const TIMEOUT_SECS: u64 = 120;

pub struct DockerRuntime {
    docker: Docker,
    network_name: String,
}

impl DockerRuntime {
    /// Builds a client for `endpoint`, or for the local daemon's default
    /// socket when none is given. No request is sent yet.
    pub fn connect(endpoint: Option<&str>, network_name: impl Into<String>) -> Result<Self> {
        let docker = match endpoint {
            None => Docker::connect_with_local_defaults(),
            Some(endpoint) => connect_endpoint(endpoint),
        }
        .with_context(|| {
            format!(
                "Failed to set up Docker client for {}",
                endpoint.unwrap_or("local defaults")
            )
        })?;
        let network_name = network_name.into();
        info!(
            "Docker client ready ({}), tracking network {}",
            endpoint.unwrap_or("local defaults"),
            network_name
        );
        Ok(Self {
            docker,
            network_name,
        })
    }
}

#[cfg(unix)]
fn connect_endpoint(endpoint: &str) -> Result<Docker, bollard::errors::Error> {
    if endpoint.starts_with("unix://") || endpoint.starts_with('/') {
        Docker::connect_with_unix(endpoint, TIMEOUT_SECS, API_DEFAULT_VERSION)
    } else {
        Docker::connect_with_http(endpoint, TIMEOUT_SECS, API_DEFAULT_VERSION)
    }
}

#[cfg(windows)]
fn connect_endpoint(endpoint: &str) -> Result<Docker, bollard::errors::Error> {
    if endpoint.starts_with("npipe://") || endpoint.starts_with(r"\\") {
        Docker::connect_with_named_pipe(endpoint, TIMEOUT_SECS, API_DEFAULT_VERSION)
    } else {
        Docker::connect_with_http(endpoint, TIMEOUT_SECS, API_DEFAULT_VERSION)
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running(&self) -> Result<Vec<String>> {
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn inspect(&self, container_id: &str) -> Result<Option<Attachment>> {
        let detail = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await?;
        Ok(attachment_on(&detail, &self.network_name))
    }

    fn events(&self) -> BoxStream<'_, Result<NetworkEvent>> {
        let filters: HashMap<String, Vec<String>> = [
            ("type", vec!["network"]),
            ("event", vec!["connect", "disconnect"]),
            ("network", vec![self.network_name.as_str()]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into_iter().map(str::to_string).collect()))
        .collect();
        let opts = EventsOptions::<String> {
            filters,
            ..Default::default()
        };

        let network_name = self.network_name.clone();
        self.docker
            .events(Some(opts))
            .filter_map(move |msg| {
                future::ready(match msg {
                    Ok(event) => to_network_event(event, &network_name).map(Ok),
                    Err(e) => Some(Err(e.into())),
                })
            })
            .boxed()
    }
}

/// Translates a raw Docker event into an attach/detach for the tracked
/// network. Anything else is dropped.
fn to_network_event(event: EventMessage, network_name: &str) -> Option<NetworkEvent> {
    if event.typ != Some(EventMessageTypeEnum::NETWORK) {
        return None;
    }
    let attributes = event.actor?.attributes?;
    if let Some(name) = attributes.get("name") {
        if name != network_name {
            debug!("Ignoring event for network {}", name);
            return None;
        }
    }
    let container_id = attributes.get("container").filter(|id| !id.is_empty())?.clone();

    match event.action.as_deref()? {
        "connect" => Some(NetworkEvent::Attach { container_id }),
        "disconnect" => Some(NetworkEvent::Detach { container_id }),
        _ => None,
    }
}

fn attachment_on(detail: &ContainerInspectResponse, network_name: &str) -> Option<Attachment> {
    let endpoint = detail
        .network_settings
        .as_ref()?
        .networks
        .as_ref()?
        .get(network_name)?;

    let address = endpoint
        .ip_address
        .as_deref()
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            endpoint
                .global_ipv6_address
                .as_deref()
                .filter(|ip| !ip.is_empty())
        })?;

    Some(Attachment {
        address: address.to_string(),
        aliases: endpoint.aliases.clone().unwrap_or_default(),
    })
}
