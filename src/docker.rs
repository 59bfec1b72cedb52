use async_trait::async_trait;
use bollard::{
    container::InspectContainerOptions,
    models::{ContainerInspectResponse, NetworkSettings},
    Docker,
};
use log::{debug, info};
use tokio::sync::OnceCell;
use typed_builder::TypedBuilder;

/// Addresses of one container as reported by the engine. Empty strings mean "no address".
#[derive(Debug, Clone, Default, PartialEq, Eq, TypedBuilder)]
pub struct ContainerNetworkInfo {
    // Address on the default bridge
    #[builder(default, setter(into))]
    pub ip_address: String,
    // (network name, address on that network)
    #[builder(default)]
    pub networks: Vec<(String, String)>,
}

impl From<NetworkSettings> for ContainerNetworkInfo {
    fn from(settings: NetworkSettings) -> Self {
        let mut networks: Vec<(String, String)> = settings
            .networks
            .unwrap_or_default()
            .into_iter()
            .map(|(name, endpoint)| (name, endpoint.ip_address.unwrap_or_default()))
            .collect();
        // The engine hands networks over as a JSON object; fix an order so answers are stable.
        networks.sort_by(|a, b| a.0.cmp(&b.0));

        ContainerNetworkInfo::builder()
            .ip_address(settings.ip_address.unwrap_or_default())
            .networks(networks)
            .build()
    }
}

/// Read-only view of the container engine, shared by every request in flight.
#[async_trait]
pub trait ContainerInspector: Send + Sync {
    /// Looks a container up by id, id prefix or name. `Err` when the engine does not know it (or
    /// could not be asked), `Ok(None)` when it exists without any network settings.
    async fn inspect(&self, id: &str) -> anyhow::Result<Option<ContainerNetworkInfo>>;
}

pub struct DockerInspector {
    docker: Docker,
    // Set by the first lookup that reaches the engine; a failed negotiation is retried next time.
    negotiated: OnceCell<Docker>,
}

impl DockerInspector {
    /// Sets up a client the way the docker CLI does (`DOCKER_HOST` and friends, else the local
    /// socket). Nothing is sent to the engine until the first lookup, so a daemon that is down
    /// at startup only costs the lookups made while it is down.
    pub fn connect() -> anyhow::Result<DockerInspector> {
        let docker = Docker::connect_with_defaults()?;

        Ok(DockerInspector {
            docker,
            negotiated: OnceCell::new(),
        })
    }

    async fn client(&self) -> Result<&Docker, bollard::errors::Error> {
        self.negotiated
            .get_or_try_init(|| async {
                let docker = self.docker.clone().negotiate_version().await?;
                info!("Using docker engine API {}", docker.client_version());
                Ok::<_, bollard::errors::Error>(docker)
            })
            .await
    }
}

#[async_trait]
impl ContainerInspector for DockerInspector {
    async fn inspect(&self, id: &str) -> anyhow::Result<Option<ContainerNetworkInfo>> {
        debug!("Inspecting container {}", id);

        let ContainerInspectResponse {
            network_settings, ..
        } = self
            .client()
            .await?
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;

        Ok(network_settings.map(ContainerNetworkInfo::from))
    }
}
