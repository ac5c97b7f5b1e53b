use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Segments kept from a resource pool path: "", datacenter, "host", cluster
const CLUSTER_PATH_SEGMENTS: usize = 4;

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
pub struct ProviderSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// The subset of machine.openshift.io/v1beta1 Machine this controller reads.
/// The CRD itself is owned by the machine-api operator.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "Machine",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    #[serde(default)]
    pub provider_spec: ProviderSpec,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub resource_pool: String,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VsphereMachineProviderSpec {
    pub workspace: Option<Workspace>,
}

impl Machine {
    pub fn vsphere_provider_spec(&self) -> Result<VsphereMachineProviderSpec, Error> {
        let value = self
            .spec
            .provider_spec
            .value
            .clone()
            .ok_or_else(|| Error::ConfigDecode(self.name_any(), "providerSpec.value is empty".into()))?;
        serde_json::from_value(value).map_err(|e| Error::ConfigDecode(self.name_any(), e.to_string()))
    }

    pub fn vsphere_workspace(&self) -> Result<Workspace, Error> {
        self.vsphere_provider_spec()?.workspace.ok_or_else(|| {
            Error::ConfigDecode(self.name_any(), "providerSpec has no workspace".into())
        })
    }

    /// Inventory path of the vSphere cluster this machine's resource pool lives in
    pub fn vsphere_cluster_path(&self) -> Result<String, Error> {
        cluster_path(&self.vsphere_workspace()?.resource_pool)
    }
}

/// Truncate a resource pool path such as "/DC1/host/Cluster1/Resources/sub1"
/// to the cluster it belongs to ("/DC1/host/Cluster1").
pub fn cluster_path(resource_pool: &str) -> Result<String, Error> {
    let segments: Vec<&str> = resource_pool.split('/').collect();
    if segments.len() < CLUSTER_PATH_SEGMENTS {
        return Err(Error::MalformedPath(
            resource_pool.to_string(),
            format!(
                "expected at least {CLUSTER_PATH_SEGMENTS} segments, got {}",
                segments.len()
            ),
        ));
    }

    let prefix = &segments[..CLUSTER_PATH_SEGMENTS];
    if prefix[1..].iter().any(|s| s.is_empty()) {
        return Err(Error::MalformedPath(
            resource_pool.to_string(),
            "empty datacenter, folder or cluster segment".into(),
        ));
    }
    Ok(prefix.join("/"))
}
