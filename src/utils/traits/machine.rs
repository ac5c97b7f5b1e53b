use crate::crd::machine::Machine;
use crate::labels_and_annotations::VM_GROUP_LABEL;
use kube::ResourceExt;
use std::collections::BTreeMap;

/// The VM group a set of labels asks for, if any. Empty values are ignored.
pub fn vm_group_label(labels: &BTreeMap<String, String>) -> Option<&str> {
    labels
        .get(VM_GROUP_LABEL)
        .map(|group| group.trim())
        .filter(|group| !group.is_empty())
}

pub trait MachineExt {
    fn requested_vm_group(&self) -> Option<String>;
}

impl MachineExt for Machine {
    fn requested_vm_group(&self) -> Option<String> {
        vm_group_label(self.labels()).map(String::from)
    }
}
