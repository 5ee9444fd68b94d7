//! Docker-backed provisioner using Testcontainers.
//!
//! Containers are started from a [`GenericImage`] built from [`RunOptions`]. Host
//! and mapped ports are resolved once at start so the probe loop never talks to
//! the Docker daemon.

use super::{HarnessError, Provisioned, Provisioner, RunOptions};
use async_trait::async_trait;
use std::collections::HashMap;
use testcontainers::core::IntoContainerPort;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ContainerRequest, GenericImage, ImageExt};
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct DockerProvisioner;

#[async_trait]
impl Provisioner for DockerProvisioner {
    async fn provision(
        &self,
        options: &RunOptions,
    ) -> Result<Box<dyn Provisioned>, HarnessError> {
        let provision_error = |e: &dyn std::fmt::Display| HarnessError::Provision {
            image: options.image(),
            message: e.to_string(),
        };

        let mut image = GenericImage::new(options.image_repo.as_str(), options.image_tag.as_str());
        for port in &options.ports {
            image = image.with_exposed_port(port.tcp());
        }

        let mut request: ContainerRequest<GenericImage> = image.into();
        for (key, value) in &options.env {
            request = request.with_env_var(key.as_str(), value.as_str());
        }

        let container = request.start().await.map_err(|e| provision_error(&e))?;
        let host = container.get_host().await.map_err(|e| provision_error(&e))?.to_string();

        let mut ports = HashMap::new();
        for port in &options.ports {
            let mapped =
                container.get_host_port_ipv4(port.tcp()).await.map_err(|e| provision_error(&e))?;
            ports.insert(*port, mapped);
        }

        info!(image = %options.image(), container_id = %container.id(), "container started");
        Ok(Box::new(DockerInstance { container, host, ports }))
    }
}

struct DockerInstance {
    container: ContainerAsync<GenericImage>,
    host: String,
    ports: HashMap<u16, u16>,
}

#[async_trait]
impl Provisioned for DockerInstance {
    fn host(&self) -> &str {
        &self.host
    }

    fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports.get(&container_port).copied()
    }

    async fn stop(self: Box<Self>) -> Result<(), HarnessError> {
        let id = self.container.id().to_string();
        self.container.rm().await.map_err(|e| HarnessError::Teardown(e.to_string()))?;
        info!(container_id = %id, "container removed");
        Ok(())
    }
}
