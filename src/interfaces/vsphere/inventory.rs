use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::Error;
use crate::interfaces::vsphere::lowlevel::Vim;
use crate::interfaces::vsphere::types::{
    ClusterConfigInfoEx, ClusterGroupInfo, ClusterVmGroup, MoRef, ObjectContent, TYPE_CLUSTER,
    TYPE_DATACENTER, TYPE_FOLDER, TYPE_VIRTUAL_MACHINE,
};
use crate::interfaces::vsphere::views::list_objects;
use crate::interfaces::vsphere::vmgroup::VmGroup;

const VM_NAME_PROPERTY: &str = "summary.config.name";

/// Name based lookups against the vSphere inventory. The Vim implementation
/// scans the whole inventory on every call; an indexed or cached strategy can
/// be slotted in behind the same trait.
#[async_trait]
pub trait InventoryLookup: Send + Sync {
    /// The VM group `group_name` of the cluster at inventory path `cluster_path`
    async fn find_group(&self, cluster_path: &str, group_name: &str) -> Result<VmGroup, Error>;
    /// A virtual machine anywhere in the inventory
    async fn find_vm(&self, vm_name: &str) -> Result<MoRef, Error>;
}

#[async_trait]
impl InventoryLookup for Vim {
    #[instrument(skip(self))]
    async fn find_group(&self, cluster_path: &str, group_name: &str) -> Result<VmGroup, Error> {
        let cluster = self.find_cluster(cluster_path).await?;
        let config: ClusterConfigInfoEx = self.get(&cluster, "configurationEx").await?;

        let info = select_vm_group(config.group, group_name)
            .ok_or_else(|| Error::GroupNotFound(cluster_path.to_string(), group_name.to_string()))?;
        debug!(
            "vsphere: found group {} in {} with {} members",
            group_name,
            cluster_path,
            info.vm.len()
        );
        Ok(VmGroup { cluster, info })
    }

    #[instrument(skip(self))]
    async fn find_vm(&self, vm_name: &str) -> Result<MoRef, Error> {
        let vms = list_objects(self, &[TYPE_VIRTUAL_MACHINE], &[VM_NAME_PROPERTY]).await?;
        select_vm(&vms, vm_name).ok_or_else(|| Error::VmNotFound(vm_name.to_string()))
    }
}

impl Vim {
    /// Resolve an inventory path like "/DC1/host/ClusterA" to exactly one cluster
    #[instrument(skip(self))]
    pub async fn find_cluster(&self, cluster_path: &str) -> Result<MoRef, Error> {
        let entities = list_objects(
            self,
            &[TYPE_FOLDER, TYPE_DATACENTER, TYPE_CLUSTER],
            &["name", "parent"],
        )
        .await?;
        let root = self.content().root_folder.clone();
        select_cluster(&inventory_paths(&entities, &root, TYPE_CLUSTER), cluster_path)
    }
}

/// Inventory paths ("/DC1/host/ClusterA") of every entity of `kind`, built by
/// walking `parent` links up to the root folder. The root folder itself is
/// not part of the path.
pub fn inventory_paths(entities: &[ObjectContent], root: &MoRef, kind: &str) -> Vec<(String, MoRef)> {
    let by_ref: HashMap<&MoRef, &ObjectContent> = entities.iter().map(|e| (&e.obj, e)).collect();

    entities
        .iter()
        .filter(|e| e.obj.kind == kind)
        .filter_map(|entity| {
            let mut names = Vec::new();
            let mut current = Some(entity);
            // an inventory tree is never deeper than the number of entities in it
            for _ in 0..=entities.len() {
                let Some(node) = current else {
                    break;
                };
                names.push(node.string_property("name")?);
                current = match node.moref_property("parent") {
                    Some(parent) if &parent == root => None,
                    Some(parent) => Some(*by_ref.get(&parent)?),
                    None => None,
                };
            }
            if current.is_some() {
                return None;
            }
            names.reverse();
            Some((format!("/{}", names.join("/")), entity.obj.clone()))
        })
        .collect()
}

/// Exactly one exact match, anything else is an error
pub fn select_cluster(paths: &[(String, MoRef)], cluster_path: &str) -> Result<MoRef, Error> {
    let wanted = cluster_path.trim_end_matches('/');
    let matches: Vec<&MoRef> = paths
        .iter()
        .filter(|(path, _)| path == wanted)
        .map(|(_, cluster)| cluster)
        .collect();
    match matches.as_slice() {
        [cluster] => Ok((*cluster).clone()),
        _ => Err(Error::AmbiguousOrMissingCluster(
            cluster_path.to_string(),
            matches.len(),
        )),
    }
}

pub fn select_vm_group(groups: Vec<ClusterGroupInfo>, group_name: &str) -> Option<ClusterVmGroup> {
    groups.into_iter().find_map(|group| match group {
        ClusterGroupInfo::ClusterVmGroup(vm_group) if vm_group.name == group_name => Some(vm_group),
        _ => None,
    })
}

pub fn select_vm(vms: &[ObjectContent], vm_name: &str) -> Option<MoRef> {
    vms.iter()
        .find(|vm| vm.string_property(VM_NAME_PROPERTY) == Some(vm_name))
        .map(|vm| vm.obj.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::vsphere::testing::{API, logged_in, mock_container_view};
    use serde_json::{Value, json};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entity(kind: &str, id: &str, name: &str, parent: Option<(&str, &str)>) -> Value {
        let mut props = vec![json!({"name": "name", "val": {"_typeName": "string", "_value": name}})];
        if let Some((parent_kind, parent_id)) = parent {
            props.push(json!({"name": "parent", "val": {
                "_typeName": "ManagedObjectReference", "type": parent_kind, "value": parent_id
            }}));
        }
        json!({"obj": {"type": kind, "value": id}, "propSet": props})
    }

    /// Two datacenters, DC2 nested in a folder, both with a cluster called ClusterA
    fn inventory() -> Vec<Value> {
        vec![
            entity("Datacenter", "datacenter-1", "DC1", Some(("Folder", "group-d1"))),
            entity("Folder", "group-h1", "host", Some(("Datacenter", "datacenter-1"))),
            entity("ClusterComputeResource", "domain-c1", "ClusterA", Some(("Folder", "group-h1"))),
            entity("ClusterComputeResource", "domain-c2", "ClusterB", Some(("Folder", "group-h1"))),
            entity("Folder", "group-d2", "emea", Some(("Folder", "group-d1"))),
            entity("Datacenter", "datacenter-2", "DC2", Some(("Folder", "group-d2"))),
            entity("Folder", "group-h2", "host", Some(("Datacenter", "datacenter-2"))),
            entity("ClusterComputeResource", "domain-c3", "ClusterA", Some(("Folder", "group-h2"))),
        ]
    }

    fn contents(values: Vec<Value>) -> Vec<ObjectContent> {
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect()
    }

    fn root() -> MoRef {
        MoRef::new(TYPE_FOLDER, "group-d1")
    }

    #[test]
    fn builds_cluster_inventory_paths() {
        let mut paths = inventory_paths(&contents(inventory()), &root(), TYPE_CLUSTER);
        paths.sort_by(|a, b| a.0.cmp(&b.0));
        let paths: Vec<&str> = paths.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/DC1/host/ClusterA", "/DC1/host/ClusterB", "/emea/DC2/host/ClusterA"]
        );
    }

    #[test]
    fn entities_with_unknown_ancestors_are_skipped() {
        let values = vec![entity(
            "ClusterComputeResource",
            "domain-c9",
            "Orphan",
            Some(("Folder", "group-h9")),
        )];
        assert!(inventory_paths(&contents(values), &root(), TYPE_CLUSTER).is_empty());
    }

    #[test]
    fn select_cluster_requires_exactly_one_match() {
        let cluster = MoRef::new(TYPE_CLUSTER, "domain-c1");
        let paths = vec![
            ("/DC1/host/ClusterA".to_string(), cluster.clone()),
            ("/DC1/host/Dup".to_string(), MoRef::new(TYPE_CLUSTER, "domain-c5")),
            ("/DC1/host/Dup".to_string(), MoRef::new(TYPE_CLUSTER, "domain-c6")),
        ];

        assert_eq!(select_cluster(&paths, "/DC1/host/ClusterA").unwrap(), cluster);
        assert_eq!(select_cluster(&paths, "/DC1/host/ClusterA/").unwrap(), cluster);
        assert!(matches!(
            select_cluster(&paths, "/DC1/host/Missing"),
            Err(Error::AmbiguousOrMissingCluster(_, 0))
        ));
        assert!(matches!(
            select_cluster(&paths, "/DC1/host/Dup"),
            Err(Error::AmbiguousOrMissingCluster(_, 2))
        ));
    }

    #[test]
    fn select_vm_group_ignores_host_groups_with_same_name() {
        let groups = vec![
            ClusterGroupInfo::Other,
            ClusterGroupInfo::ClusterVmGroup(ClusterVmGroup {
                name: "web-tier".into(),
                ..Default::default()
            }),
        ];
        assert_eq!(select_vm_group(groups.clone(), "web-tier").unwrap().name, "web-tier");
        assert!(select_vm_group(groups, "db-tier").is_none());
    }

    async fn mock_inventory(server: &MockServer) {
        mock_container_view(server, "view-entities").await;
        Mock::given(method("POST"))
            .and(path(format!("{API}/PropertyCollector/propertyCollector/RetrievePropertiesEx")))
            .and(body_partial_json(json!({"specSet": [{"propSet": [{"type": "Folder", "pathSet": ["name", "parent"]}]}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"objects": inventory()})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn find_group_reads_cluster_configuration() {
        let server = MockServer::start().await;
        let vim = logged_in(&server).await;
        mock_inventory(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{API}/ClusterComputeResource/domain-c3/configurationEx")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_typeName": "ClusterConfigInfoEx",
                "group": [
                    {"_typeName": "ClusterHostGroup", "name": "web-tier", "host": []},
                    {"_typeName": "ClusterVmGroup", "name": "web-tier", "vm": [
                        {"_typeName": "ManagedObjectReference", "type": "VirtualMachine", "value": "vm-7"}
                    ]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let group = vim.find_group("/emea/DC2/host/ClusterA", "web-tier").await.unwrap();
        assert_eq!(group.cluster, MoRef::new(TYPE_CLUSTER, "domain-c3"));
        assert!(group.has_vm(&MoRef::new(TYPE_VIRTUAL_MACHINE, "vm-7")));
    }

    #[tokio::test]
    async fn find_group_misses_unknown_group() {
        let server = MockServer::start().await;
        let vim = logged_in(&server).await;
        mock_inventory(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{API}/ClusterComputeResource/domain-c1/configurationEx")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_typeName": "ClusterConfigInfoEx",
                "group": [{"_typeName": "ClusterVmGroup", "name": "db-tier"}]
            })))
            .mount(&server)
            .await;

        let err = vim.find_group("/DC1/host/ClusterA", "web-tier").await.unwrap_err();
        assert!(matches!(err, Error::GroupNotFound(..)));
    }

    #[tokio::test]
    async fn find_group_on_missing_cluster_fails() {
        let server = MockServer::start().await;
        let vim = logged_in(&server).await;
        mock_inventory(&server).await;

        let err = vim.find_group("/DC9/host/ClusterA", "web-tier").await.unwrap_err();
        assert!(matches!(err, Error::AmbiguousOrMissingCluster(_, 0)));
    }

    async fn mock_vms(server: &MockServer) {
        mock_container_view(server, "view-vms").await;
        Mock::given(method("POST"))
            .and(path(format!("{API}/PropertyCollector/propertyCollector/RetrievePropertiesEx")))
            .and(body_partial_json(json!({"specSet": [{"propSet": [{"type": "VirtualMachine", "pathSet": ["summary.config.name"]}]}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "objects": [
                    {"obj": {"type": "VirtualMachine", "value": "vm-41"}, "propSet": [
                        {"name": "summary.config.name", "val": {"_typeName": "string", "_value": "node-0"}}
                    ]},
                    {"obj": {"type": "VirtualMachine", "value": "vm-42"}, "propSet": [
                        {"name": "summary.config.name", "val": {"_typeName": "string", "_value": "node-1"}}
                    ]}
                ]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn find_vm_matches_config_name() {
        let server = MockServer::start().await;
        let vim = logged_in(&server).await;
        mock_vms(&server).await;

        let vm = vim.find_vm("node-1").await.unwrap();
        assert_eq!(vm, MoRef::new(TYPE_VIRTUAL_MACHINE, "vm-42"));
    }

    #[tokio::test]
    async fn find_vm_misses_unknown_name() {
        let server = MockServer::start().await;
        let vim = logged_in(&server).await;
        mock_vms(&server).await;

        let err = vim.find_vm("node-9").await.unwrap_err();
        assert!(matches!(err, Error::VmNotFound(name) if name == "node-9"));
    }
}
