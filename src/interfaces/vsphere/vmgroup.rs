use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::Error;
use crate::interfaces::vsphere::lowlevel::Vim;
use crate::interfaces::vsphere::session::VimSession;
use crate::interfaces::vsphere::types::{ClusterGroupInfo, ClusterVmGroup, MoRef};

/// A VM group as fetched from its cluster. The member list is a snapshot and
/// may already be stale when it is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmGroup {
    pub cluster: MoRef,
    pub info: ClusterVmGroup,
}

impl VmGroup {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn has_vm(&self, vm: &MoRef) -> bool {
        self.info.vm.contains(vm)
    }

    /// A copy of this group with `vm` appended to its members
    pub fn with_vm(&self, vm: &MoRef) -> VmGroup {
        let mut group = self.clone();
        group.info.vm.push(vm.clone());
        group
    }
}

/// Add `vm` to `group` unless the snapshot already lists it. Returns whether
/// an edit was submitted. The reconfigure task is not awaited; a failed or
/// still running task is picked up by the next reconciliation.
#[instrument(skip(session, group), fields(group = %group.name(), cluster = %group.cluster))]
pub async fn ensure_member(
    session: &dyn VimSession,
    group: &VmGroup,
    vm: &MoRef,
) -> Result<bool, Error> {
    if group.has_vm(vm) {
        return Ok(false);
    }

    let task = session
        .reconfigure_group(&group.with_vm(vm))
        .await
        .map_err(|e| match e {
            Error::MembershipUpdate(..) | Error::Cancelled(_) => e,
            other => Error::MembershipUpdate(group.name().to_string(), other.to_string()),
        })?;
    info!(
        "vsphere: submitted {} to add {} to group {}",
        task,
        vm,
        group.name()
    );
    Ok(true)
}

/// ClusterConfigSpecEx editing a single group. The group is sent in full,
/// there is no way to add a single member.
pub fn group_edit_spec(group: &VmGroup) -> Result<Value, Error> {
    let info = serde_json::to_value(ClusterGroupInfo::ClusterVmGroup(group.info.clone()))?;
    Ok(json!({
        "spec": {
            "_typeName": "ClusterConfigSpecEx",
            "groupSpec": [{
                "_typeName": "ClusterGroupSpec",
                "operation": "edit",
                "info": info,
            }],
        },
        "modify": true,
    }))
}

impl Vim {
    #[instrument(skip(self, group), fields(group = %group.name()))]
    pub async fn submit_group_edit(&self, group: &VmGroup) -> Result<MoRef, Error> {
        self.invoke(
            &group.cluster,
            "ReconfigureComputeResource_Task",
            &group_edit_spec(group)?,
        )
        .await
        .map_err(|e| match e {
            Error::Cancelled(_) => e,
            other => Error::MembershipUpdate(group.name().to_string(), other.to_string()),
        })
    }
}
