// Machine labels
pub const VM_GROUP_LABEL: &str = "vmware.bit.admin.ch/drs-vm-group";
