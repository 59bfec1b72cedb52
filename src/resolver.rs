use std::sync::Arc;

use log::debug;

use crate::{ContainerInspector, ResolveError};

/// Turns a container identifier into the addresses the engine currently reports for it.
#[derive(Clone)]
pub struct ContainerResolver {
    inspector: Arc<dyn ContainerInspector>,
}

impl ContainerResolver {
    pub fn new(inspector: Arc<dyn ContainerInspector>) -> ContainerResolver {
        ContainerResolver { inspector }
    }

    /// Primary address first, then one entry per network address, skipping empty ones.
    /// Repeated addresses are kept; an empty list is still a successful lookup.
    pub async fn resolve(&self, id: &str) -> Result<Vec<String>, ResolveError> {
        let info = self
            .inspector
            .inspect(id)
            .await
            .map_err(|cause| ResolveError::NotFound {
                id: id.to_string(),
                cause,
            })?
            .ok_or_else(|| ResolveError::NoNetworkInfo(id.to_string()))?;

        let addresses: Vec<String> = Some(info.ip_address)
            .into_iter()
            .chain(info.networks.into_iter().map(|(_network, address)| address))
            .filter(|address| !address.is_empty())
            .collect();

        debug!("Container {} has addresses {:?}", id, addresses);
        Ok(addresses)
    }
}
