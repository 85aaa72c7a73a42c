//! Cluster resources and the groups they are started in.
//!
//! A resource is anything the cluster manager places on exactly one node at a
//! time: an IP address, a filesystem, a daemon. The harness only needs to ask
//! whether a resource is active on a given node.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::config::{ResourceGroupConfig, NODE_PLACEHOLDER};
use crate::remote::RemoteExec;

/// Resource kind exercised by the IP address takeover test.
pub const IPADDR_KIND: &str = "IPaddr";

/// A managed cluster resource.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Resource type, e.g. `IPaddr`.
    fn kind(&self) -> &str;

    /// Resource instance, e.g. `10.10.10.50`.
    fn instance(&self) -> &str;

    /// Whether the resource is currently active on `node`.
    async fn is_running_on(&self, node: &str) -> bool;
}

impl fmt::Display for dyn Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}::{}}}", self.kind(), self.instance())
    }
}

impl fmt::Debug for dyn Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Resources started together, in order.
pub type ResourceGroup = Vec<Arc<dyn Resource>>;

/// Supplies the resource groups the cluster is configured with.
pub trait ResourceGroupProvider: Send + Sync {
    /// Every resource group.
    fn resource_groups(&self) -> Vec<ResourceGroup>;
}

/// Resource probed by running a status command on the node.
pub struct RemoteResource {
    kind: String,
    instance: String,
    status_cmd: String,
    exec: Arc<dyn RemoteExec>,
}

impl RemoteResource {
    /// Create a resource whose `status_cmd` (with `%s` replaced by the
    /// instance) exits 0 on a node where it is active.
    pub fn new(
        kind: impl Into<String>,
        instance: impl Into<String>,
        status_cmd: &str,
        exec: Arc<dyn RemoteExec>,
    ) -> Self {
        let instance = instance.into();
        Self {
            kind: kind.into(),
            status_cmd: status_cmd.replace(NODE_PLACEHOLDER, &instance),
            instance,
            exec,
        }
    }

    /// Command run on a node to probe this resource.
    pub fn status_command(&self) -> &str {
        &self.status_cmd
    }
}

#[async_trait]
impl Resource for RemoteResource {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn instance(&self) -> &str {
        &self.instance
    }

    async fn is_running_on(&self, node: &str) -> bool {
        match self.exec.exec_once(node, &self.status_cmd).await {
            Ok(code) => code == 0,
            Err(e) => {
                tracing::warn!("Could not probe {}::{} on {}: {}", self.kind, self.instance, node, e);
                false
            }
        }
    }
}

/// Resource groups built from the `[[resource_groups]]` configuration.
#[derive(Default)]
pub struct ConfiguredResources {
    groups: Vec<ResourceGroup>,
}

impl ConfiguredResources {
    /// Build every configured group, probing through `exec`.
    pub fn from_config(groups: &[ResourceGroupConfig], exec: Arc<dyn RemoteExec>) -> Self {
        let groups = groups
            .iter()
            .map(|group| {
                group
                    .resources
                    .iter()
                    .map(|r| {
                        Arc::new(RemoteResource::new(
                            r.kind.clone(),
                            r.instance.clone(),
                            &r.status_cmd,
                            Arc::clone(&exec),
                        )) as Arc<dyn Resource>
                    })
                    .collect()
            })
            .collect();
        Self { groups }
    }

    /// Provider with no resources; the placement audit passes trivially.
    pub fn none() -> Self {
        Self::default()
    }

    /// Wrap already-built groups.
    pub fn from_groups(groups: Vec<ResourceGroup>) -> Self {
        Self { groups }
    }
}

impl ResourceGroupProvider for ConfiguredResources {
    fn resource_groups(&self) -> Vec<ResourceGroup> {
        self.groups.clone()
    }
}

/// Every resource of `kind` across all groups, in group order.
pub fn resources_of_kind(groups: &[ResourceGroup], kind: &str) -> Vec<Arc<dyn Resource>> {
    groups
        .iter()
        .flatten()
        .filter(|r| r.kind() == kind)
        .cloned()
        .collect()
}
