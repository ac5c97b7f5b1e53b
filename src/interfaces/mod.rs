pub mod vsphere;
